//! # Checkpoints
//!
//! A checkpoint is the full prior content of a file, taken right before a
//! risky write. It is consumed when the change is confirmed and used to roll
//! back when the change is rejected. There is at most one checkpoint per file;
//! a second snapshot replaces the first.

use crate::workspace::Workspace;
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct CheckpointStore {
    workspace: Arc<dyn Workspace>,
    entries: Mutex<HashMap<PathBuf, String>>,
}

impl CheckpointStore {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self {
            workspace,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Reads the current content of `path` and stores it, replacing any
    /// earlier checkpoint for the same file.
    pub async fn snapshot(&self, path: &Path) -> Result<()> {
        let content = self.workspace.read_file(path).await?;
        self.lock()?.insert(path.to_path_buf(), content);
        tracing::debug!(path = %path.display(), "checkpoint created");
        Ok(())
    }

    /// Writes the stored content back. Returns `false` if there was nothing
    /// to restore. The checkpoint itself is kept.
    pub async fn restore(&self, path: &Path) -> Result<bool> {
        let stored = self.lock()?.get(path).cloned();
        match stored {
            Some(content) => {
                self.workspace.write_file(path, &content).await?;
                tracing::info!(path = %path.display(), "checkpoint restored");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops the checkpoint for `path`. Returns whether one existed.
    pub fn clear(&self, path: &Path) -> Result<bool> {
        Ok(self.lock()?.remove(path).is_some())
    }

    /// Files that currently have an unconfirmed change.
    pub fn pending(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PathBuf, String>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("checkpoint store lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::LocalWorkspace;
    use std::fs;
    use tempfile::Builder;

    fn setup(content: &str) -> (tempfile::TempDir, PathBuf, CheckpointStore) {
        let tmp_dir = Builder::new().prefix("test-checkpoint-").tempdir().unwrap();
        let file_path = tmp_dir.path().join("test.txt");
        fs::write(&file_path, content).unwrap();
        let store = CheckpointStore::new(Arc::new(LocalWorkspace::new(tmp_dir.path())));
        (tmp_dir, file_path, store)
    }

    #[tokio::test]
    async fn test_snapshot_mutate_restore_round_trips() {
        let original = "line 1\r\n  line 2\t\n\n";
        let (_tmp_dir, file_path, store) = setup(original);

        store.snapshot(&file_path).await.unwrap();
        fs::write(&file_path, "completely different").unwrap();

        assert!(store.restore(&file_path).await.unwrap());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), original);
    }

    #[tokio::test]
    async fn test_snapshot_mutate_clear_keeps_mutation() {
        let (_tmp_dir, file_path, store) = setup("before");

        store.snapshot(&file_path).await.unwrap();
        fs::write(&file_path, "after").unwrap();

        assert!(store.clear(&file_path).unwrap());
        assert!(!store.pending().contains(&file_path));
        assert!(!store.restore(&file_path).await.unwrap());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "after");
    }

    #[tokio::test]
    async fn test_second_snapshot_overwrites_first() {
        let (_tmp_dir, file_path, store) = setup("v1");

        store.snapshot(&file_path).await.unwrap();
        fs::write(&file_path, "v2").unwrap();
        store.snapshot(&file_path).await.unwrap();
        fs::write(&file_path, "v3").unwrap();

        store.restore(&file_path).await.unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "v2");
        assert_eq!(store.pending(), vec![file_path]);
    }

    #[tokio::test]
    async fn test_restore_without_checkpoint_is_noop() {
        let (_tmp_dir, file_path, store) = setup("untouched");
        assert!(!store.restore(&file_path).await.unwrap());
        assert!(!store.clear(&file_path).unwrap());
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "untouched");
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_file_fails() {
        let (tmp_dir, _file_path, store) = setup("");
        let missing = tmp_dir.path().join("missing.txt");
        assert!(store.snapshot(&missing).await.is_err());
        assert!(!store.pending().contains(&missing));
    }
}
