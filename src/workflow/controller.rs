//! The workflow controller: entry points and settlement logic.
//!
//! ## Latest wins
//!
//! Every `select_file` and `submit` takes a fresh operation token; so does
//! `remove_file`. When a Detect or Convert call settles, its result is applied
//! only if its token is still the current one. Superseded calls are left to
//! finish on their own and their results are dropped.
//!
//! ## Locking
//!
//! State sits behind one `std::sync::Mutex`, never held across an `.await`.
//! Observer callbacks run under that lock so the progress sequence a
//! submission delivers is strictly ordered even though the synthetic ramp
//! ticks on its own task.

use crate::config::{ClientConfig, ProgressTuning};
use crate::error::{FileconvError, Notice, WorkflowError};
use crate::progress::{NoopObserver, ObserverHandle};
use crate::services::{ConvertService, DetectService, HttpServices, UploadProgress};
use crate::workflow::estimator::ProgressEstimator;
use crate::workflow::filename::suggest_filename;
use crate::workflow::ticker::PeriodicTask;
use crate::workflow::{ConvertedFile, Phase, SelectedFile, Workflow, WorkflowSnapshot};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives one conversion workflow from file selection to result retrieval.
///
/// Cheap to share behind an `Arc`; all entry points take `&self`.
pub struct WorkflowController {
    shared: Arc<Shared>,
    detect: Arc<dyn DetectService>,
    convert: Arc<dyn ConvertService>,
}

struct Shared {
    state: Mutex<State>,
    observer: ObserverHandle,
    notice_duration: Duration,
    tick_interval: Duration,
}

struct State {
    workflow: Workflow,
    estimator: ProgressEstimator,
    /// Synthetic-progress timer of the current submission, if running.
    ramp: Option<PeriodicTask>,
    token: u64,
}

impl State {
    fn next_token(&mut self) -> u64 {
        self.token += 1;
        self.token
    }

    fn stop_ramp(&mut self) {
        if let Some(mut ramp) = self.ramp.take() {
            ramp.cancel();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum OperationKind {
    Detect,
    Submit,
}

impl WorkflowController {
    /// Build a controller over explicit service implementations.
    ///
    /// Progress tuning that would not pass [`ClientConfig::builder`]
    /// validation is replaced by the defaults.
    pub fn new(
        detect: Arc<dyn DetectService>,
        convert: Arc<dyn ConvertService>,
        config: &ClientConfig,
    ) -> Self {
        let tuning = match config.progress.validate() {
            Ok(()) => config.progress,
            Err(e) => {
                warn!("{}; using default progress tuning", e);
                ProgressTuning::default()
            }
        };
        Self::with_tuning(detect, convert, tuning, config.notice_duration())
    }

    /// Build a controller talking HTTP to the endpoints in `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, FileconvError> {
        let services = Arc::new(HttpServices::new(config)?);
        Ok(Self::new(services.clone(), services, config))
    }

    fn with_tuning(
        detect: Arc<dyn DetectService>,
        convert: Arc<dyn ConvertService>,
        tuning: ProgressTuning,
        notice_duration: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    workflow: Workflow::default(),
                    estimator: ProgressEstimator::new(tuning),
                    ramp: None,
                    token: 0,
                }),
                observer: Arc::new(NoopObserver),
                notice_duration,
                tick_interval: tuning.tick_interval(),
            }),
            detect,
            convert,
        }
    }

    /// Install the observer that receives state, progress and notices.
    ///
    /// Must be called before the controller is shared.
    pub fn with_observer(mut self, observer: ObserverHandle) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.observer = observer,
            None => warn!("with_observer called on a shared controller; observer not installed"),
        }
        self
    }

    /// Current state, for rendering or inspection.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.shared.lock().workflow.snapshot()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.shared.lock().workflow.phase()
    }

    // ── Entry points ─────────────────────────────────────────────────────

    /// Select a file and detect its format. Valid from any state; supersedes
    /// whatever was in flight. Returns the phase once detection settles.
    pub async fn select_file(&self, file: SelectedFile) -> Phase {
        let filename = file.name().to_string();
        let token = {
            let mut st = self.shared.lock();
            let token = st.next_token();
            st.stop_ramp();
            st.estimator.reset();
            st.workflow.begin_detection(file);
            self.shared.emit_state(&st);
            token
        };
        info!("Selected '{}'; detecting format", filename);

        let mut guard = PendingOperation::new(&self.shared, token, OperationKind::Detect);
        let outcome = self.detect.detect(&filename).await;
        guard.disarm();

        let mut st = self.shared.lock();
        if st.token != token {
            debug!("Detection of '{}' superseded; result ignored", filename);
            return st.workflow.phase();
        }

        let detection = outcome.unwrap_or_else(|e| {
            warn!("Detect call for '{}' failed: {}", filename, e);
            Default::default()
        });

        match detection.into_actionable() {
            Ok((format, targets)) => {
                info!(
                    "Detected '{}' as {} ({} targets)",
                    filename,
                    format,
                    targets.len()
                );
                st.workflow.detection_succeeded(format, targets);
                self.shared.emit_state(&st);
            }
            Err(reason) => {
                let error = WorkflowError::unsupported(reason);
                warn!("'{}' is not supported: {}", filename, error);
                st.workflow.detection_failed(error.clone());
                self.shared.emit_state(&st);
                self.shared.emit_notice(error);
            }
        }
        st.workflow.phase()
    }

    /// Choose the target format. Only valid in `Ready` or `Completed` with a
    /// listed target; anything else is a no-op returning `false`.
    pub fn choose_target(&self, format: &str) -> bool {
        let mut st = self.shared.lock();
        if !st.workflow.choose_target(format) {
            debug!(
                "Ignoring target '{}' in phase {} (available: {:?})",
                format,
                st.workflow.phase(),
                st.workflow.available_targets()
            );
            return false;
        }
        debug!("Target set to {}", format);
        self.shared.emit_state(&st);
        true
    }

    /// Drop the selection and everything derived from it. Valid in any state.
    pub fn remove_file(&self) {
        let mut st = self.shared.lock();
        st.next_token();
        st.stop_ramp();
        st.estimator.reset();
        st.workflow.reset();
        info!("Workflow reset");
        self.shared.emit_state(&st);
    }

    /// Upload the selected file for conversion to the chosen target.
    ///
    /// Only valid in `Ready` or `Completed` with a chosen target; otherwise
    /// returns the current phase untouched. A resubmission from `Completed`
    /// discards the previous result. Otherwise resolves once the Convert call
    /// settles, to `Completed`, `LimitBlocked` or (after a transient failure)
    /// `Ready`.
    pub async fn submit(&self) -> Phase {
        let (token, request) = {
            let mut st = self.shared.lock();
            let Some(request) = st.workflow.conversion_request() else {
                debug!("Submit ignored in phase {}", st.workflow.phase());
                return st.workflow.phase();
            };
            let token = st.next_token();
            st.stop_ramp();
            st.estimator.begin();
            st.workflow.begin_submission();
            self.shared.emit_state(&st);
            self.shared.observer.on_progress(0);
            (token, request)
        };
        info!(
            "Submitting '{}' for conversion to {}",
            request.file.name(),
            request.target
        );

        let reporter: Arc<dyn UploadProgress> = Arc::new(SubmissionProgress {
            shared: Arc::downgrade(&self.shared),
            token,
        });
        let original = request.file.name().to_string();
        let target = request.target.clone();

        let mut guard = PendingOperation::new(&self.shared, token, OperationKind::Submit);
        let outcome = self.convert.convert(request, reporter).await;
        guard.disarm();

        let mut st = self.shared.lock();
        if st.token != token {
            debug!("Submission of '{}' superseded; result ignored", original);
            return st.workflow.phase();
        }
        st.stop_ramp();

        match outcome {
            Ok(reply) => {
                let filename =
                    suggest_filename(&original, &target, reply.content_disposition.as_deref());
                if let Some(p) = st.estimator.on_settled(true) {
                    st.workflow.set_progress(p);
                    self.shared.observer.on_progress(p);
                }
                info!(
                    "Conversion complete: '{}' ({} bytes)",
                    filename,
                    reply.bytes.len()
                );
                st.workflow.complete(ConvertedFile {
                    bytes: reply.bytes,
                    filename,
                });
                self.shared.emit_state(&st);
            }
            Err(e) => {
                st.estimator.on_settled(false);
                warn!("Conversion of '{}' failed: {}", original, e);
                let error = WorkflowError::from_conversion(e);
                match error {
                    WorkflowError::LimitExceeded { .. } => {
                        st.workflow.block_on_limit(error.clone());
                        self.shared.emit_state(&st);
                        self.shared.emit_notice(error);
                    }
                    _ => {
                        st.workflow.fail(error.clone());
                        self.shared.emit_state(&st);
                        self.shared.emit_notice(error);
                        st.estimator.reset();
                        st.workflow.recover();
                        self.shared.emit_state(&st);
                    }
                }
            }
        }
        st.workflow.phase()
    }

    /// Dismiss the limit notice. Only valid in `LimitBlocked`; returns to
    /// `Ready` with the selection, detection and chosen target intact.
    pub fn acknowledge_limit(&self) -> bool {
        let mut st = self.shared.lock();
        if !st.workflow.acknowledge_limit() {
            debug!("acknowledge_limit ignored in phase {}", st.workflow.phase());
            return false;
        }
        st.estimator.reset();
        self.shared.emit_state(&st);
        true
    }

    /// The converted output, when the workflow is `Completed`. Does not
    /// change state and can be called repeatedly.
    pub fn retrieve_result(&self) -> Option<ConvertedFile> {
        let st = self.shared.lock();
        match st.workflow.phase() {
            Phase::Completed => st.workflow.result().cloned(),
            _ => None,
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit_state(&self, st: &State) {
        self.observer.on_state_change(&st.workflow.snapshot());
    }

    fn emit_notice(&self, error: WorkflowError) {
        self.observer
            .on_notice(&Notice::new(error, self.notice_duration));
    }

    /// The future of an in-flight operation was dropped before it settled.
    fn abandon(&self, token: u64, kind: OperationKind) {
        let mut st = self.lock();
        if st.token != token {
            return;
        }
        warn!("{:?} operation abandoned before it settled", kind);
        st.next_token();
        st.stop_ramp();
        st.estimator.reset();
        match kind {
            OperationKind::Detect => st.workflow.reset(),
            OperationKind::Submit => st.workflow.recover(),
        }
        self.emit_state(&st);
    }
}

/// Rolls the workflow back if an entry-point future is dropped mid-flight.
struct PendingOperation {
    shared: Weak<Shared>,
    token: u64,
    kind: OperationKind,
    armed: bool,
}

impl PendingOperation {
    fn new(shared: &Arc<Shared>, token: u64, kind: OperationKind) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            token,
            kind,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingOperation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.abandon(self.token, self.kind);
        }
    }
}

/// Upload progress sink bound to one submission attempt.
struct SubmissionProgress {
    shared: Weak<Shared>,
    token: u64,
}

impl UploadProgress for SubmissionProgress {
    fn on_progress(&self, sent: u64, total: Option<u64>) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut st = shared.lock();
        if st.token != self.token {
            return;
        }
        if let Some(p) = st.estimator.on_upload_progress(sent, total) {
            st.workflow.set_progress(p);
            shared.observer.on_progress(p);
        }
    }

    fn on_complete(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut st = shared.lock();
        if st.token != self.token {
            return;
        }
        if let Some(p) = st.estimator.on_upload_complete() {
            st.workflow.set_progress(p);
            shared.observer.on_progress(p);
        }
        if st.ramp.is_some() || !st.estimator.in_synthetic_phase() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime; synthetic progress disabled for this submission");
            return;
        }
        debug!("Upload finished; starting synthetic progress");
        let weak = Arc::downgrade(&shared);
        let token = self.token;
        st.ramp = Some(PeriodicTask::spawn(shared.tick_interval, move || {
            synthetic_tick(&weak, token)
        }));
    }
}

/// One step of the synthetic ramp. Returns `false` once the submission that
/// owns the ramp is gone.
fn synthetic_tick(shared: &Weak<Shared>, token: u64) -> bool {
    let Some(shared) = shared.upgrade() else {
        return false;
    };
    let mut st = shared.lock();
    if st.token != token || !st.estimator.in_synthetic_phase() {
        return false;
    }
    if let Some(p) = st.estimator.tick() {
        st.workflow.set_progress(p);
        shared.observer.on_progress(p);
    }
    true
}
