//! Configuration types for the conversion client.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. Endpoint locations, timeouts and the progress
//! estimator's tuning all live here so a controller and its HTTP bindings can
//! be constructed from one value.

use crate::error::FileconvError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for a conversion client.
///
/// # Example
/// ```rust
/// use fileconv::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("https://convert.example.com")
///     .csrf_token("abc123")
///     .convert_timeout_secs(900)
///     .build()
///     .unwrap();
/// assert_eq!(config.detect_url(), "https://convert.example.com/api/detect/");
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Scheme + host (+ optional port) of the conversion server, no trailing slash.
    /// Default: `http://127.0.0.1:8000`.
    pub base_url: String,

    /// Path of the Detect endpoint. Default: `/api/detect/`.
    pub detect_path: String,

    /// Path of the Convert endpoint. Default: `/api/convert/`.
    pub convert_path: String,

    /// Anti-forgery token supplied by the hosting environment.
    ///
    /// When `None`, the HTTP bindings fall back to the `csrftoken` cookie the
    /// detect endpoint sets. The client never generates a token.
    pub csrf_token: Option<String>,

    /// Timeout for a Detect call in seconds. Default: 30.
    pub detect_timeout_secs: u64,

    /// Timeout for a Convert call in seconds. Default: 600.
    ///
    /// Conversion time on the server is unbounded (video transcodes can take
    /// minutes), so this is deliberately generous.
    pub convert_timeout_secs: u64,

    /// Size of each streamed upload chunk in bytes. Default: 64 KiB.
    ///
    /// Upload progress is reported once per chunk.
    pub upload_chunk_size: usize,

    /// How long a transient notice stays visible, in milliseconds. Default: 4000.
    pub notice_duration_ms: u64,

    /// Progress estimator tuning.
    pub progress: ProgressTuning,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            detect_path: "/api/detect/".to_string(),
            convert_path: "/api/convert/".to_string(),
            csrf_token: None,
            detect_timeout_secs: 30,
            convert_timeout_secs: 600,
            upload_chunk_size: 64 * 1024,
            notice_duration_ms: 4000,
            progress: ProgressTuning::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("detect_path", &self.detect_path)
            .field("convert_path", &self.convert_path)
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "<redacted>"))
            .field("detect_timeout_secs", &self.detect_timeout_secs)
            .field("convert_timeout_secs", &self.convert_timeout_secs)
            .field("upload_chunk_size", &self.upload_chunk_size)
            .field("notice_duration_ms", &self.notice_duration_ms)
            .field("progress", &self.progress)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Absolute URL of the Detect endpoint.
    pub fn detect_url(&self) -> String {
        join_url(&self.base_url, &self.detect_path)
    }

    /// Absolute URL of the Convert endpoint.
    pub fn convert_url(&self) -> String {
        join_url(&self.base_url, &self.convert_path)
    }

    /// Visible duration of transient notices.
    pub fn notice_duration(&self) -> Duration {
        Duration::from_millis(self.notice_duration_ms)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn detect_path(mut self, path: impl Into<String>) -> Self {
        self.config.detect_path = path.into();
        self
    }

    pub fn convert_path(mut self, path: impl Into<String>) -> Self {
        self.config.convert_path = path.into();
        self
    }

    pub fn csrf_token(mut self, token: impl Into<String>) -> Self {
        self.config.csrf_token = Some(token.into());
        self
    }

    pub fn detect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.detect_timeout_secs = secs.max(1);
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout_secs = secs.max(1);
        self
    }

    pub fn upload_chunk_size(mut self, bytes: usize) -> Self {
        self.config.upload_chunk_size = bytes.max(1024);
        self
    }

    pub fn notice_duration_ms(mut self, ms: u64) -> Self {
        self.config.notice_duration_ms = ms;
        self
    }

    pub fn progress(mut self, tuning: ProgressTuning) -> Self {
        self.config.progress = tuning;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, FileconvError> {
        let c = &self.config;
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(FileconvError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.detect_path.is_empty() || c.convert_path.is_empty() {
            return Err(FileconvError::InvalidConfig(
                "endpoint paths must not be empty".into(),
            ));
        }
        c.progress.validate()?;
        Ok(self.config)
    }
}

// ── Progress tuning ──────────────────────────────────────────────────────

/// Shape of the two-phase progress signal.
///
/// | Phase | Range | Driven by |
/// |-------|-------|-----------|
/// | Upload | 0 → `upload_share` | bytes sent / bytes total |
/// | Synthetic | `upload_share` → below `ceiling` | `tick_step` every `tick_interval_ms` |
/// | Done | 100 | successful settlement only |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressTuning {
    /// Percentage covered by the upload phase. Default: 50.
    pub upload_share: u8,
    /// Period of the synthetic ramp in milliseconds. Default: 200.
    pub tick_interval_ms: u64,
    /// Increment per synthetic tick. Default: 5.
    pub tick_step: u8,
    /// Exclusive upper bound while the conversion is pending. Default: 95.
    pub ceiling: u8,
}

impl Default for ProgressTuning {
    fn default() -> Self {
        Self {
            upload_share: 50,
            tick_interval_ms: 200,
            tick_step: 5,
            ceiling: 95,
        }
    }
}

impl ProgressTuning {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), FileconvError> {
        if self.ceiling >= 100 {
            return Err(FileconvError::InvalidConfig(format!(
                "progress ceiling must be below 100, got {}",
                self.ceiling
            )));
        }
        if self.upload_share >= self.ceiling {
            return Err(FileconvError::InvalidConfig(format!(
                "upload share ({}) must be below the ceiling ({})",
                self.upload_share, self.ceiling
            )));
        }
        if self.tick_step == 0 || self.tick_interval_ms == 0 {
            return Err(FileconvError::InvalidConfig(
                "tick step and tick interval must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_server_layout() {
        let c = ClientConfig::default();
        assert_eq!(c.detect_url(), "http://127.0.0.1:8000/api/detect/");
        assert_eq!(c.convert_url(), "http://127.0.0.1:8000/api/convert/");
        assert_eq!(c.notice_duration(), Duration::from_millis(4000));
        assert_eq!(c.progress.tick_interval(), Duration::from_millis(200));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = ClientConfig::builder()
            .base_url("https://example.com/")
            .convert_path("convert/")
            .build()
            .unwrap();
        assert_eq!(c.convert_url(), "https://example.com/convert/");
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = ClientConfig::builder()
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http://"));
    }

    #[test]
    fn rejects_ceiling_at_or_above_100() {
        let tuning = ProgressTuning {
            ceiling: 100,
            ..ProgressTuning::default()
        };
        assert!(ClientConfig::builder().progress(tuning).build().is_err());
    }

    #[test]
    fn rejects_upload_share_above_ceiling() {
        let tuning = ProgressTuning {
            upload_share: 96,
            ..ProgressTuning::default()
        };
        assert!(ClientConfig::builder().progress(tuning).build().is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let c = ClientConfig::builder().csrf_token("secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn setters_clamp() {
        let c = ClientConfig::builder()
            .upload_chunk_size(1)
            .detect_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.upload_chunk_size, 1024);
        assert_eq!(c.detect_timeout_secs, 1);
    }
}
