//! The conversion workflow: data model, controller and progress machinery.
//!
//! ## State machine
//!
//! ```text
//!            select_file                 detect ok            choose_target + submit
//!   Idle ───────────────▶ Detecting ───────────────▶ Ready ─────────────────────▶ Submitting
//!    ▲                        │                       ▲ ▲                            │
//!    │   unsupported / error  │                       │ │  Failed (transient)        │
//!    └────────────────────────┘                       │ └────────────────────────────┤
//!                                                     │    acknowledge_limit         │
//!                                                     └──────── LimitBlocked ◀───────┤
//!                                                                                    ▼
//!                                                     choose_target + submit ◀── Completed
//! ```
//!
//! `remove_file` returns to `Idle` from anywhere; `select_file` restarts
//! detection from anywhere.
//!
//! 1. [`controller`]: the state machine and its entry points
//! 2. [`estimator`]: two-phase progress signal for one submission
//! 3. [`ticker`]: owned periodic task driving the synthetic phase
//! 4. [`filename`]: output filename policy

pub mod controller;
pub mod estimator;
pub mod filename;
pub mod ticker;

use crate::error::{FileconvError, WorkflowError};
use crate::services::ConvertRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub use controller::WorkflowController;
pub use estimator::ProgressEstimator;
pub use filename::{derive_filename, filename_from_disposition, suggest_filename};
pub use ticker::PeriodicTask;

// ── Files ────────────────────────────────────────────────────────────────

/// The file the user picked: a name plus its bytes.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    name: String,
    bytes: Arc<[u8]>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Read a file from disk, keeping only its final path component as the name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, FileconvError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FileconvError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => FileconvError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => FileconvError::FileRead {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FileconvError::FileRead {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            })?;
        debug!("Loaded '{}' ({} bytes)", name, bytes.len());
        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A finished conversion: output bytes and the name to save them under.
#[derive(Clone, PartialEq, Eq)]
pub struct ConvertedFile {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl ConvertedFile {
    /// Write the result into `dir` atomically and return the final path.
    ///
    /// Only the final component of `filename` is used, so a hostile
    /// server-supplied name cannot escape `dir`.
    pub fn save_into(&self, dir: impl AsRef<Path>) -> Result<PathBuf, FileconvError> {
        let dir = dir.as_ref();
        let name = Path::new(&self.filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "converted".into());
        let path = dir.join(name);

        let write_err = |source: std::io::Error| FileconvError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(write_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        std::io::Write::write_all(&mut tmp, &self.bytes).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        debug!("Saved {} bytes to {}", self.bytes.len(), path.display());
        Ok(path)
    }
}

impl fmt::Debug for ConvertedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertedFile")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ── Phase ────────────────────────────────────────────────────────────────

/// Where the workflow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No file selected.
    Idle,
    /// Detect call in flight.
    Detecting,
    /// Format detected, waiting for a target and submission.
    Ready,
    /// Upload and conversion in flight.
    Submitting,
    /// Result available.
    Completed,
    /// Recoverable error; immediately followed by `Ready` or `Idle`.
    Failed,
    /// Quota hit; waiting for acknowledgment.
    LimitBlocked,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Detecting => "detecting",
            Phase::Ready => "ready",
            Phase::Submitting => "submitting",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::LimitBlocked => "limit_blocked",
        };
        f.write_str(s)
    }
}

// ── Workflow aggregate ───────────────────────────────────────────────────

/// The single mutable aggregate behind a controller.
///
/// Mutators keep the invariants: `chosen_target` is always one of
/// `available_targets`, and `result` exists only in [`Phase::Completed`].
#[derive(Debug, Clone)]
pub struct Workflow {
    selected_file: Option<SelectedFile>,
    detected_format: Option<String>,
    available_targets: Vec<String>,
    chosen_target: Option<String>,
    progress_percent: u8,
    phase: Phase,
    result: Option<ConvertedFile>,
    last_error: Option<WorkflowError>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            selected_file: None,
            detected_format: None,
            available_targets: Vec::new(),
            chosen_target: None,
            progress_percent: 0,
            phase: Phase::Idle,
            result: None,
            last_error: None,
        }
    }
}

impl Workflow {
    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.selected_file.as_ref()
    }

    pub fn detected_format(&self) -> Option<&str> {
        self.detected_format.as_deref()
    }

    pub fn available_targets(&self) -> &[String] {
        &self.available_targets
    }

    pub fn chosen_target(&self) -> Option<&str> {
        self.chosen_target.as_deref()
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn result(&self) -> Option<&ConvertedFile> {
        self.result.as_ref()
    }

    pub fn last_error(&self) -> Option<&WorkflowError> {
        self.last_error.as_ref()
    }

    /// Whether the submit affordance is enabled.
    pub fn can_submit(&self) -> bool {
        self.accepts_target() && self.selected_file.is_some() && self.chosen_target.is_some()
    }

    /// `Ready`, or `Completed` where the user may convert the same file again.
    fn accepts_target(&self) -> bool {
        matches!(self.phase, Phase::Ready | Phase::Completed)
    }

    /// Serialisable summary for rendering.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            phase: self.phase,
            file_name: self.selected_file.as_ref().map(|f| f.name().to_string()),
            file_size: self.selected_file.as_ref().map(|f| f.len() as u64),
            detected_format: self.detected_format.clone(),
            available_targets: self.available_targets.clone(),
            chosen_target: self.chosen_target.clone(),
            progress_percent: self.progress_percent,
            can_submit: self.can_submit(),
            result_filename: self.result.as_ref().map(|r| r.filename.clone()),
            last_error: self.last_error.clone(),
        }
    }

    // ── Transitions (crate-internal; the controller sequences them) ───────

    pub(crate) fn reset(&mut self) {
        *self = Workflow::default();
    }

    pub(crate) fn begin_detection(&mut self, file: SelectedFile) {
        self.reset();
        self.selected_file = Some(file);
        self.phase = Phase::Detecting;
    }

    pub(crate) fn detection_succeeded(&mut self, format: String, targets: Vec<String>) {
        self.detected_format = Some(format);
        self.available_targets = targets;
        self.chosen_target = None;
        self.phase = Phase::Ready;
    }

    pub(crate) fn detection_failed(&mut self, error: WorkflowError) {
        self.reset();
        self.last_error = Some(error);
    }

    /// Returns `true` when the target was accepted.
    pub(crate) fn choose_target(&mut self, format: &str) -> bool {
        if !self.accepts_target() {
            return false;
        }
        match self.available_targets.iter().find(|t| t.as_str() == format) {
            Some(target) => {
                self.chosen_target = Some(target.clone());
                true
            }
            None => false,
        }
    }

    /// The request `submit` would send, when submission is enabled.
    pub(crate) fn conversion_request(&self) -> Option<ConvertRequest> {
        if !self.can_submit() {
            return None;
        }
        Some(ConvertRequest {
            file: self.selected_file.clone()?,
            target: self.chosen_target.clone()?,
        })
    }

    pub(crate) fn begin_submission(&mut self) {
        self.phase = Phase::Submitting;
        self.progress_percent = 0;
        self.result = None;
        self.last_error = None;
    }

    pub(crate) fn set_progress(&mut self, percent: u8) {
        self.progress_percent = self.progress_percent.max(percent.min(100));
    }

    pub(crate) fn complete(&mut self, result: ConvertedFile) {
        self.progress_percent = 100;
        self.result = Some(result);
        self.phase = Phase::Completed;
    }

    pub(crate) fn block_on_limit(&mut self, error: WorkflowError) {
        self.last_error = Some(error);
        self.phase = Phase::LimitBlocked;
    }

    pub(crate) fn acknowledge_limit(&mut self) -> bool {
        if self.phase != Phase::LimitBlocked {
            return false;
        }
        self.phase = Phase::Ready;
        self.progress_percent = 0;
        true
    }

    pub(crate) fn fail(&mut self, error: WorkflowError) {
        self.last_error = Some(error);
        self.phase = Phase::Failed;
    }

    /// Leave `Failed` (or an abandoned operation) for the nearest stable state.
    pub(crate) fn recover(&mut self) {
        if self.selected_file.is_none() || self.detected_format.is_none() {
            let last_error = self.last_error.take();
            self.reset();
            self.last_error = last_error;
            return;
        }
        self.progress_percent = 0;
        self.result = None;
        self.phase = Phase::Ready;
    }
}

/// Render-ready view of a [`Workflow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub phase: Phase,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub detected_format: Option<String>,
    pub available_targets: Vec<String>,
    pub chosen_target: Option<String>,
    pub progress_percent: u8,
    pub can_submit: bool,
    pub result_filename: Option<String>,
    pub last_error: Option<WorkflowError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_workflow() -> Workflow {
        let mut w = Workflow::default();
        w.begin_detection(SelectedFile::new("report.docx", b"PK..".to_vec()));
        w.detection_succeeded("docx".into(), vec!["pdf".into(), "txt".into()]);
        w
    }

    #[test]
    fn choose_target_requires_membership() {
        let mut w = ready_workflow();
        assert!(!w.choose_target("mp3"));
        assert_eq!(w.chosen_target(), None);
        assert!(!w.can_submit());

        assert!(w.choose_target("pdf"));
        assert_eq!(w.chosen_target(), Some("pdf"));
        assert!(w.can_submit());
    }

    #[test]
    fn choose_target_outside_ready_is_rejected() {
        let mut w = Workflow::default();
        assert!(!w.choose_target("pdf"));
        assert_eq!(w.phase(), Phase::Idle);
    }

    #[test]
    fn result_only_in_completed() {
        let mut w = ready_workflow();
        w.choose_target("pdf");
        w.begin_submission();
        assert!(w.result().is_none());
        w.complete(ConvertedFile {
            bytes: vec![1, 2, 3],
            filename: "report.pdf".into(),
        });
        assert_eq!(w.phase(), Phase::Completed);
        assert_eq!(w.progress_percent(), 100);
        assert!(w.result().is_some());
    }

    #[test]
    fn completed_accepts_another_target() {
        let mut w = ready_workflow();
        w.choose_target("pdf");
        w.begin_submission();
        w.complete(ConvertedFile {
            bytes: vec![1],
            filename: "report.pdf".into(),
        });
        assert!(w.can_submit());
        assert!(!w.choose_target("mp3"));
        assert!(w.choose_target("txt"));
        assert_eq!(w.phase(), Phase::Completed);

        let request = w.conversion_request().unwrap();
        assert_eq!(request.target, "txt");
        w.begin_submission();
        assert!(w.result().is_none());
        assert_eq!(w.progress_percent(), 0);
    }

    #[test]
    fn recover_keeps_selection_when_detected() {
        let mut w = ready_workflow();
        w.choose_target("txt");
        w.begin_submission();
        w.set_progress(40);
        w.fail(WorkflowError::ConversionFailure {
            message: "boom".into(),
        });
        assert_eq!(w.phase(), Phase::Failed);
        w.recover();
        assert_eq!(w.phase(), Phase::Ready);
        assert_eq!(w.chosen_target(), Some("txt"));
        assert_eq!(w.detected_format(), Some("docx"));
        assert_eq!(w.progress_percent(), 0);
    }

    #[test]
    fn recover_without_detection_goes_idle() {
        let mut w = Workflow::default();
        w.begin_detection(SelectedFile::new("a.bin", vec![0u8; 3]));
        w.recover();
        assert_eq!(w.phase(), Phase::Idle);
        assert!(w.selected_file().is_none());
    }

    #[test]
    fn set_progress_is_monotonic_and_bounded() {
        let mut w = ready_workflow();
        w.set_progress(30);
        w.set_progress(10);
        assert_eq!(w.progress_percent(), 30);
        w.set_progress(250);
        assert_eq!(w.progress_percent(), 100);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut w = ready_workflow();
        w.choose_target("pdf");
        let snap = w.snapshot();
        assert_eq!(snap.phase, Phase::Ready);
        assert_eq!(snap.file_name.as_deref(), Some("report.docx"));
        assert_eq!(snap.file_size, Some(4));
        assert!(snap.can_submit);
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains(r#""phase":"ready""#));
    }

    #[test]
    fn save_into_writes_result_and_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConvertedFile {
            bytes: b"%PDF-1.7".to_vec(),
            filename: "../../escape.pdf".into(),
        };
        let path = result.save_into(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("escape.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let file = SelectedFile::from_path(&path).await.unwrap();
        assert_eq!(file.name(), "notes.txt");
        assert_eq!(file.bytes(), b"hello");

        let missing = SelectedFile::from_path(dir.path().join("nope.txt")).await;
        assert!(matches!(missing, Err(FileconvError::FileNotFound { .. })));
    }
}
