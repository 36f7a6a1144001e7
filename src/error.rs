//! Error types for the fileconv library.
//!
//! Three error types reflect three distinct layers:
//!
//! * [`FileconvError`]: **Fatal**: the library cannot even start a
//!   workflow (bad configuration, unreadable input file, HTTP client could
//!   not be built, result could not be written). Returned as `Err` from
//!   constructors and I/O helpers.
//!
//! * [`ServiceError`]: what a Detect or Convert binding reports back to the
//!   controller. It describes the transport outcome, not what the user sees.
//!
//! * [`WorkflowError`]: the user-facing taxonomy. The controller maps every
//!   [`ServiceError`] onto one of these, stores it as the workflow's last
//!   error and emits it as a notice. It never aborts the workflow.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Message used when detection fails without a server-supplied reason.
pub const UNSUPPORTED_FORMAT_MESSAGE: &str = "file format is not supported";
/// Message used when a conversion failure body cannot be decoded.
pub const CONVERSION_FAILED_MESSAGE: &str = "conversion failed";
/// Message used when a limit failure carries no message of its own.
pub const LIMIT_REACHED_MESSAGE: &str = "conversion limit reached";
/// Message used when the Convert call could not complete.
pub const NETWORK_ERROR_MESSAGE: &str = "network error";

/// All fatal errors returned by the fileconv library.
#[derive(Debug, Error)]
pub enum FileconvError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The path exists but is not a regular file or could not be read.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the converted output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Failure reported by a Detect or Convert service binding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The request could not complete (DNS, connect, reset, timeout).
    #[error("request failed: {reason}")]
    Network { reason: String },

    /// The server answered with a failure status.
    ///
    /// `message` is `None` when the body could not be decoded.
    #[error("server rejected the request (HTTP {status})")]
    Rejected {
        status: u16,
        message: Option<String>,
        limit_exceeded: bool,
    },

    /// The server answered but the payload was not what the protocol expects.
    #[error("malformed response: {detail}")]
    Malformed { detail: String },
}

/// How a notice should be surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Self-dismissing toast, visible for a bounded duration.
    Transient,
    /// Modal that stays until the user acknowledges it.
    Blocking,
}

/// User-facing workflow error taxonomy.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowError {
    /// Detection found nothing actionable. Returns the workflow to `Idle`.
    #[error("{message}")]
    UnsupportedFormat { message: String },

    /// The Convert call could not complete.
    #[error("{message}")]
    NetworkFailure { message: String },

    /// The server understood the request but produced no output.
    #[error("{message}")]
    ConversionFailure { message: String },

    /// Quota or rate limit hit; needs explicit acknowledgment.
    #[error("{message}")]
    LimitExceeded { message: String },
}

impl WorkflowError {
    /// Severity that decides toast vs modal.
    pub fn severity(&self) -> Severity {
        match self {
            WorkflowError::LimitExceeded { .. } => Severity::Blocking,
            _ => Severity::Transient,
        }
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        match self {
            WorkflowError::UnsupportedFormat { message }
            | WorkflowError::NetworkFailure { message }
            | WorkflowError::ConversionFailure { message }
            | WorkflowError::LimitExceeded { message } => message,
        }
    }

    /// Detection failure, with the server's reason when it gave one.
    pub fn unsupported(reason: Option<String>) -> Self {
        WorkflowError::UnsupportedFormat {
            message: non_empty(reason).unwrap_or_else(|| UNSUPPORTED_FORMAT_MESSAGE.to_string()),
        }
    }

    /// Classify a failed Convert call.
    pub fn from_conversion(err: ServiceError) -> Self {
        match err {
            ServiceError::Network { .. } => WorkflowError::NetworkFailure {
                message: NETWORK_ERROR_MESSAGE.to_string(),
            },
            ServiceError::Rejected {
                message,
                limit_exceeded: true,
                ..
            } => WorkflowError::LimitExceeded {
                message: non_empty(message).unwrap_or_else(|| LIMIT_REACHED_MESSAGE.to_string()),
            },
            ServiceError::Rejected { message, .. } => WorkflowError::ConversionFailure {
                message: non_empty(message)
                    .unwrap_or_else(|| CONVERSION_FAILED_MESSAGE.to_string()),
            },
            ServiceError::Malformed { .. } => WorkflowError::ConversionFailure {
                message: CONVERSION_FAILED_MESSAGE.to_string(),
            },
        }
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|m| !m.trim().is_empty())
}

/// A workflow error packaged for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub error: WorkflowError,
    pub severity: Severity,
    /// How long a transient notice stays visible. `None` for blocking notices.
    pub display_for: Option<Duration>,
}

impl Notice {
    pub fn new(error: WorkflowError, transient_duration: Duration) -> Self {
        let severity = error.severity();
        let display_for = match severity {
            Severity::Transient => Some(transient_duration),
            Severity::Blocking => None,
        };
        Self {
            error,
            severity,
            display_for,
        }
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_flag_selects_blocking_error() {
        let e = WorkflowError::from_conversion(ServiceError::Rejected {
            status: 400,
            message: Some("Daily limit reached".into()),
            limit_exceeded: true,
        });
        assert_eq!(
            e,
            WorkflowError::LimitExceeded {
                message: "Daily limit reached".into()
            }
        );
        assert_eq!(e.severity(), Severity::Blocking);
    }

    #[test]
    fn undecodable_rejection_uses_fallback_message() {
        let e = WorkflowError::from_conversion(ServiceError::Rejected {
            status: 500,
            message: None,
            limit_exceeded: false,
        });
        assert_eq!(e.message(), CONVERSION_FAILED_MESSAGE);
        assert_eq!(e.severity(), Severity::Transient);
    }

    #[test]
    fn limit_without_message_uses_fallback() {
        let e = WorkflowError::from_conversion(ServiceError::Rejected {
            status: 400,
            message: Some("   ".into()),
            limit_exceeded: true,
        });
        assert_eq!(e.message(), LIMIT_REACHED_MESSAGE);
    }

    #[test]
    fn network_and_malformed_mapping() {
        let net = WorkflowError::from_conversion(ServiceError::Network {
            reason: "connection reset".into(),
        });
        assert!(matches!(net, WorkflowError::NetworkFailure { .. }));

        let bad = WorkflowError::from_conversion(ServiceError::Malformed {
            detail: "eof".into(),
        });
        assert!(matches!(bad, WorkflowError::ConversionFailure { .. }));
    }

    #[test]
    fn unsupported_prefers_server_reason() {
        assert_eq!(
            WorkflowError::unsupported(Some("Unknown extension".into())).message(),
            "Unknown extension"
        );
        assert_eq!(
            WorkflowError::unsupported(None).message(),
            UNSUPPORTED_FORMAT_MESSAGE
        );
    }

    #[test]
    fn notice_duration_only_for_transient() {
        let d = Duration::from_millis(4000);
        let toast = Notice::new(WorkflowError::unsupported(None), d);
        assert_eq!(toast.display_for, Some(d));

        let modal = Notice::new(
            WorkflowError::LimitExceeded {
                message: "limit".into(),
            },
            d,
        );
        assert_eq!(modal.severity, Severity::Blocking);
        assert_eq!(modal.display_for, None);
    }

    #[test]
    fn file_not_found_display() {
        let e = FileconvError::FileNotFound {
            path: PathBuf::from("/tmp/missing.docx"),
        };
        assert!(e.to_string().contains("missing.docx"));
    }
}
