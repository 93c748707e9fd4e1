//! Checkpoint persistence for paused and completed sessions.
//!
//! A checkpoint is the serialized [`WorkflowState`]. It references the
//! dataset by path and never embeds table data.
//!
//! # Thread Safety
//!
//! Both stores are `Send + Sync`. [`FileCheckpointStore`] serialises writes
//! per session id with a `parking_lot::Mutex` and replaces files through a
//! temp-file rename, so a reader never sees a half-written checkpoint.

use super::state::WorkflowState;
use crate::error::{IncrementalError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Storage for session checkpoints.
pub trait CheckpointStore: Send + Sync {
    fn save(&self, state: &WorkflowState) -> Result<()>;
    fn load(&self, session_id: &str) -> Result<WorkflowState>;
    fn exists(&self, session_id: &str) -> bool;
    fn delete(&self, session_id: &str) -> Result<()>;
}

/// Checkpoints stored as `<dir>/<session>.checkpoint.json`.
pub struct FileCheckpointStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.checkpoint.json"))
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }
}

/// Session ids become file names; reject anything that could leave the directory.
fn check_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(IncrementalError::Checkpoint(format!(
            "invalid session id '{session_id}'"
        )))
    }
}

fn checkpoint_error(action: &str, path: &Path, e: impl std::fmt::Display) -> IncrementalError {
    IncrementalError::Checkpoint(format!("failed to {action} {}: {e}", path.display()))
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, state: &WorkflowState) -> Result<()> {
        check_session_id(&state.session_id)?;
        let lock = self.session_lock(&state.session_id);
        let _guard = lock.lock();

        std::fs::create_dir_all(&self.dir).map_err(|e| checkpoint_error("create", &self.dir, e))?;
        let path = self.path_for(&state.session_id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| checkpoint_error("serialize", &path, e))?;
        std::fs::write(&tmp, json).map_err(|e| checkpoint_error("write", &tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| checkpoint_error("replace", &path, e))?;

        debug!(session = %state.session_id, path = %path.display(), "Saved checkpoint");
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<WorkflowState> {
        check_session_id(session_id)?;
        let lock = self.session_lock(session_id);
        let _guard = lock.lock();

        let path = self.path_for(session_id);
        let bytes = std::fs::read(&path).map_err(|e| checkpoint_error("read", &path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| checkpoint_error("parse", &path, e))
    }

    fn exists(&self, session_id: &str) -> bool {
        check_session_id(session_id).is_ok() && self.path_for(session_id).is_file()
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        check_session_id(session_id)?;
        let lock = self.session_lock(session_id);
        let _guard = lock.lock();

        let path = self.path_for(session_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| checkpoint_error("delete", &path, e))?;
        }
        self.locks.lock().remove(session_id);
        Ok(())
    }
}

/// Checkpoints kept in memory, for tests and embedding.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    states: RwLock<HashMap<String, WorkflowState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, state: &WorkflowState) -> Result<()> {
        self.states
            .write()
            .insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<WorkflowState> {
        self.states
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| IncrementalError::Checkpoint(format!("no checkpoint for '{session_id}'")))
    }

    fn exists(&self, session_id: &str) -> bool {
        self.states.read().contains_key(session_id)
    }

    fn delete(&self, session_id: &str) -> Result<()> {
        self.states.write().remove(session_id);
        Ok(())
    }
}

static_assertions::assert_impl_all!(FileCheckpointStore: Send, Sync);
static_assertions::assert_impl_all!(InMemoryCheckpointStore: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IncrementalWorkflowConfig;

    fn state() -> WorkflowState {
        WorkflowState::new("data.csv", 42, IncrementalWorkflowConfig::default())
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let state = state();

        assert!(!store.exists(&state.session_id));
        store.save(&state).unwrap();
        assert!(store.exists(&state.session_id));
        assert!(
            store
                .path_for(&state.session_id)
                .to_string_lossy()
                .ends_with(".checkpoint.json")
        );

        let loaded = store.load(&state.session_id).unwrap();
        assert_eq!(loaded.session_id, state.session_id);
        assert_eq!(loaded.total_records, 42);

        store.delete(&state.session_id).unwrap();
        assert!(!store.exists(&state.session_id));
    }

    #[test]
    fn test_file_store_delete_releases_session_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let first = state();
        let second = state();
        store.save(&first).unwrap();
        store.save(&second).unwrap();
        assert_eq!(store.locks.lock().len(), 2);

        store.delete(&first.session_id).unwrap();
        let locks = store.locks.lock();
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key(&second.session_id));
    }

    #[test]
    fn test_file_store_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let err = store.load("does-not-exist").unwrap_err();
        assert_eq!(err.error_code(), "CHECKPOINT_ERROR");
    }

    #[test]
    fn test_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load("../escape").is_err());
        assert!(!store.exists("../escape"));
    }

    #[test]
    fn test_concurrent_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCheckpointStore::new(dir.path()));
        let state = state();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                let mut state = state.clone();
                std::thread::spawn(move || {
                    state.total_records = i;
                    store.save(&state).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.load(&state.session_id).unwrap();
        assert!(loaded.total_records < 4);
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryCheckpointStore::new();
        let state = state();
        store.save(&state).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&state.session_id).unwrap().total_records, 42);
        store.delete(&state.session_id).unwrap();
        assert!(store.is_empty());
        assert!(store.load(&state.session_id).is_err());
    }
}
