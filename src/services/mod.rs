//! External collaborators of the workflow: the Detect and Convert services.
//!
//! The controller only ever talks to these traits. [`http`] provides the
//! production bindings over HTTP; tests substitute in-memory fakes.
//!
//! ## Data Flow
//!
//! ```text
//! select_file ──▶ DetectService::detect(filename) ──▶ Detection
//! submit      ──▶ ConvertService::convert(request, progress) ──▶ ConvertReply
//!                                     │
//!                                     └─▶ UploadProgress::{on_progress, on_complete}
//! ```

pub mod http;

use crate::error::ServiceError;
use crate::workflow::SelectedFile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use http::HttpServices;

/// Payload of the Detect endpoint.
///
/// Success carries `detected` and `targets`; failure carries `error`. A
/// missing `detected` is treated exactly like an explicit error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub detected: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Detection {
    /// A successful detection.
    pub fn found(detected: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            detected: Some(detected.into()),
            targets,
            error: None,
        }
    }

    /// A failed detection with a server-supplied reason.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            detected: None,
            targets: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Split into `(format, targets)` when the detection is actionable.
    ///
    /// A detected format with zero targets is not actionable: the user could
    /// never submit it, so it is reported as unsupported. On failure the
    /// server's reason (if any) is returned.
    pub fn into_actionable(self) -> Result<(String, Vec<String>), Option<String>> {
        match self.detected {
            Some(format) if !format.trim().is_empty() && !self.targets.is_empty() => {
                Ok((format, self.targets))
            }
            _ => Err(self.error),
        }
    }
}

/// What the Convert service is asked to do.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub file: SelectedFile,
    pub target: String,
}

/// Successful Convert response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertReply {
    pub bytes: Vec<u8>,
    /// Raw `Content-Disposition` header value, when the server sent one.
    pub content_disposition: Option<String>,
}

/// Upload progress sink handed to [`ConvertService::convert`].
///
/// Bindings call `on_progress` as request body bytes go out and
/// `on_complete` once the whole body has been sent. `total` is `None` when
/// the body length is not known up front; such reports are ignored by the
/// estimator.
pub trait UploadProgress: Send + Sync {
    fn on_progress(&self, sent: u64, total: Option<u64>);

    fn on_complete(&self);
}

/// Maps a filename to its source format and the valid targets.
#[async_trait]
pub trait DetectService: Send + Sync {
    /// Detect by name only; file contents are never sent.
    async fn detect(&self, filename: &str) -> Result<Detection, ServiceError>;
}

/// Performs the conversion and returns the output bytes.
#[async_trait]
pub trait ConvertService: Send + Sync {
    async fn convert(
        &self,
        request: ConvertRequest,
        progress: Arc<dyn UploadProgress>,
    ) -> Result<ConvertReply, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actionable_detection() {
        let d = Detection::found("docx", vec!["pdf".into()]);
        assert_eq!(
            d.into_actionable(),
            Ok(("docx".to_string(), vec!["pdf".to_string()]))
        );
    }

    #[test]
    fn detected_without_targets_is_not_actionable() {
        let d = Detection::found("ico", vec![]);
        assert_eq!(d.into_actionable(), Err(None));
    }

    #[test]
    fn missing_detected_returns_reason() {
        let d = Detection::rejected("Format not supported");
        assert_eq!(
            d.into_actionable(),
            Err(Some("Format not supported".to_string()))
        );
    }

    #[test]
    fn payload_decodes_with_null_fields() {
        let d: Detection =
            serde_json::from_str(r#"{"detected": null, "targets": [], "error": "nope"}"#).unwrap();
        assert_eq!(d.detected, None);
        assert_eq!(d.error.as_deref(), Some("nope"));

        let d: Detection = serde_json::from_str(r#"{"error": "no filename"}"#).unwrap();
        assert!(d.targets.is_empty());
    }
}
