//! Durable run state for resume.
//!
//! Each run target has one [`RunState`] mapping every discovered repository
//! to its [`TaskOutcome`]. The state is written after every task through the
//! [`StateRecorder`], deleted once a run completes fully and kept otherwise,
//! so an interrupted run can pick up where it stopped.

mod recorder;
mod store;
mod types;

pub use recorder::{RECORDER_CHANNEL_SIZE, RecorderResult, StateRecorder};
pub use store::{JsonFileStore, MemoryStore, StateError, StateStore};
pub use types::{
    OutcomeCounts, ReconcileReport, RunState, TargetId, TaskOutcome, reconcile,
};

/// Default number of cumulative retries after which a failed repository is
/// no longer re-run on resume.
pub const DEFAULT_RETRY_CEILING: u32 = 10;
