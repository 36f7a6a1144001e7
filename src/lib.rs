//! # fileconv
//!
//! Client-side file conversion workflow: pick a file, let the server detect
//! its format, choose a target, upload, watch progress, retrieve the result.
//!
//! ## Why this crate?
//!
//! The conversion server does the heavy lifting, but the client still owns
//! the tricky part: sequencing two remote calls, reporting progress for a
//! conversion step the server never reports on, telling a quota failure
//! apart from an ordinary one, and making sure a late answer to an old
//! request never overwrites the state of a newer one. This crate packages
//! that logic as a testable state machine with the UI reduced to an
//! observer.
//!
//! ## Workflow Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Select    select_file(file)       → Detect(filename)
//!  ├─ 2. Choose    choose_target("pdf")    → submission enabled
//!  ├─ 3. Submit    submit()                → Convert(bytes, target, csrf)
//!  │                 ├─ upload   0 → 50 %   measured from bytes sent
//!  │                 └─ convert 50 → <95 %  synthetic ramp, 100 % on success
//!  └─ 4. Retrieve  retrieve_result()       → (bytes, filename)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fileconv::{ClientConfig, Phase, SelectedFile, WorkflowController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("http://127.0.0.1:8000")
//!         .build()?;
//!     let controller = WorkflowController::from_config(&config)?;
//!
//!     let file = SelectedFile::from_path("report.docx").await?;
//!     if controller.select_file(file).await == Phase::Ready && controller.choose_target("pdf") {
//!         if controller.submit().await == Phase::Completed {
//!             let result = controller.retrieve_result().expect("completed");
//!             result.save_into(".")?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileconv` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! fileconv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod progress;
pub mod services;
pub mod stream;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClientConfig, ClientConfigBuilder, ProgressTuning};
pub use error::{FileconvError, Notice, ServiceError, Severity, WorkflowError};
pub use progress::{NoopObserver, ObserverHandle, WorkflowObserver};
pub use services::{
    ConvertReply, ConvertRequest, ConvertService, DetectService, Detection, HttpServices,
    UploadProgress,
};
pub use stream::{event_channel, ChannelObserver, EventStream, WorkflowEvent};
pub use workflow::{
    ConvertedFile, Phase, ProgressEstimator, SelectedFile, Workflow, WorkflowController,
    WorkflowSnapshot,
};
