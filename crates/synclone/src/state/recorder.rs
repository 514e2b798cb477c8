//! Single-writer task that owns a run's [`RunState`].
//!
//! Workers never touch the store directly. They send per-repository updates
//! over a channel; the recorder applies each one to its in-memory state,
//! saves the whole state and only then acknowledges the update. A worker
//! that awaits the acknowledgement knows its outcome is durable.
//!
//! ```text
//! worker ─┐
//! worker ─┼─ record(key, outcome) ─→ StateRecorder ─→ StateStore::save
//! worker ─┘         ↑ ack                     │
//!                   └─────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::store::{StateError, StateStore};
use super::types::{RunState, TaskOutcome};
use crate::platform::RepositoryKey;

/// Channel capacity between workers and the recorder.
pub const RECORDER_CHANNEL_SIZE: usize = 64;

struct Update {
    key: RepositoryKey,
    outcome: TaskOutcome,
    ack: oneshot::Sender<Result<(), StateError>>,
}

/// Handle used by workers to record outcomes. Cheap to clone.
#[derive(Clone)]
pub struct StateRecorder {
    tx: mpsc::Sender<Update>,
}

/// Result of a finished recorder task.
#[derive(Debug)]
#[must_use = "the final state tells whether the run completed"]
pub struct RecorderResult {
    pub state: RunState,
    /// Number of saves that failed. Their updates are still in `state`.
    pub failed_saves: usize,
}

impl StateRecorder {
    /// Start the recorder task owning `state`.
    ///
    /// The task ends once every [`StateRecorder`] handle is dropped and
    /// returns the final state.
    pub fn spawn(
        store: Arc<dyn StateStore>,
        state: RunState,
    ) -> (Self, JoinHandle<RecorderResult>) {
        let (tx, rx) = mpsc::channel(RECORDER_CHANNEL_SIZE);
        let handle = tokio::spawn(run_recorder(store, state, rx));
        (Self { tx }, handle)
    }

    /// Record `outcome` for `key` and wait until it is persisted.
    pub async fn record(
        &self,
        key: RepositoryKey,
        outcome: TaskOutcome,
    ) -> Result<(), StateError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Update { key, outcome, ack })
            .await
            .map_err(|_| StateError::RecorderClosed)?;
        done.await.map_err(|_| StateError::RecorderClosed)?
    }
}

async fn run_recorder(
    store: Arc<dyn StateStore>,
    mut state: RunState,
    mut rx: mpsc::Receiver<Update>,
) -> RecorderResult {
    let mut failed_saves = 0usize;

    while let Some(update) = rx.recv().await {
        tracing::trace!(key = %update.key, status = update.outcome.label(), "Recording outcome");
        state.record(update.key, update.outcome);

        let result = store.save(&state).await;
        if let Err(ref e) = result {
            failed_saves += 1;
            tracing::warn!(error = %e, "Failed to persist run state");
        }
        // The worker may have given up waiting; the update is applied either way.
        let _ = update.ack.send(result);
    }

    RecorderResult {
        state,
        failed_saves,
    }
}
