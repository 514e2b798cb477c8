use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::MutexGuard;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use super::types::{RunState, TargetId};

/// Errors raised by a [`StateStore`].
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("state recorder is no longer running")]
    RecorderClosed,
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.into(),
        source,
    }
}

/// Durable storage of [`RunState`]s keyed by [`TargetId`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state for `id`, or `None` when no run was recorded.
    async fn load(&self, id: &TargetId) -> Result<Option<RunState>, StateError>;

    /// Replace the stored state with `state`. Idempotent.
    async fn save(&self, state: &RunState) -> Result<(), StateError>;

    /// Remove the state for `id`. Returns whether anything was removed.
    async fn clear(&self, id: &TargetId) -> Result<bool, StateError>;

    /// Every readable stored state, ordered by id.
    async fn list(&self) -> Result<Vec<RunState>, StateError>;

    /// Remove every stored state, readable or not. Returns how many were removed.
    async fn clear_all(&self) -> Result<usize, StateError>;
}

/// One pretty-printed JSON file per target in a directory.
///
/// Saves write `<id>.json.tmp` and rename it over `<id>.json`, so a crash
/// mid-write leaves the previous state intact. Writes are serialized
/// through an internal lock.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &TargetId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Paths of every `*.json` file in the directory.
    async fn state_files(&self) -> Result<Vec<PathBuf>, StateError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn read(path: &Path) -> Result<Option<RunState>, StateError> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(path, e)),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|source| StateError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self, id: &TargetId) -> Result<Option<RunState>, StateError> {
        Self::read(&self.path_for(id)).await
    }

    async fn save(&self, state: &RunState) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(state).map_err(StateError::Encode)?;
        let path = self.path_for(&state.id);
        let tmp = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err(&path, e))?;

        tracing::trace!(path = %path.display(), repos = state.outcomes.len(), "State saved");
        Ok(())
    }

    async fn clear(&self, id: &TargetId) -> Result<bool, StateError> {
        let path = self.path_for(id);
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(path, e)),
        }
    }

    /// Unreadable or corrupt files are logged and left out.
    async fn list(&self) -> Result<Vec<RunState>, StateError> {
        let mut states = Vec::new();
        for path in self.state_files().await? {
            match Self::read(&path).await {
                Ok(Some(state)) => states.push(state),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable state file"),
            }
        }
        states.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(states)
    }

    async fn clear_all(&self) -> Result<usize, StateError> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        for path in self.state_files().await? {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(path, e)),
            }
        }
        Ok(removed)
    }
}

/// In-memory store for tests and dry experiments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: std::sync::Mutex<BTreeMap<TargetId, RunState>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn states(&self) -> MutexGuard<'_, BTreeMap<TargetId, RunState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, id: &TargetId) -> Result<Option<RunState>, StateError> {
        Ok(self.states().get(id).cloned())
    }

    async fn save(&self, state: &RunState) -> Result<(), StateError> {
        self.states().insert(state.id.clone(), state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self, id: &TargetId) -> Result<bool, StateError> {
        Ok(self.states().remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<RunState>, StateError> {
        Ok(self.states().values().cloned().collect())
    }

    async fn clear_all(&self) -> Result<usize, StateError> {
        let mut states = self.states();
        let removed = states.len();
        states.clear();
        Ok(removed)
    }
}
