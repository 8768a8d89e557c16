//! # Session history
//!
//! A bounded, newest-first log of past editing and chat requests. The log is
//! persisted after every mutation through a [`KeyValueStore`] injected at
//! construction.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

pub const SESSION_HISTORY_KEY: &str = "flexpilot.sessionHistory";
pub const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Editing,
    Chat,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryEntry {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub request: String,
    pub response: String,
    pub has_file_modifications: bool,
    #[serde(default)]
    pub modified_files: Vec<String>,
    pub model_id: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl SessionHistoryEntry {
    pub fn new(kind: SessionKind, request: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            kind,
            request: request.into(),
            response: response.into(),
            has_file_modifications: false,
            modified_files: Vec::new(),
            model_id: None,
            metadata: None,
        }
    }

    pub fn with_modified_files(mut self, files: Vec<String>) -> Self {
        self.has_file_modifications = !files.is_empty();
        self.modified_files = files;
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}

/// Exact-equality filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub kind: Option<SessionKind>,
    pub has_file_modifications: Option<bool>,
    pub model_id: Option<String>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &SessionHistoryEntry) -> bool {
        self.kind.is_none_or(|kind| entry.kind == kind)
            && self
                .has_file_modifications
                .is_none_or(|flag| entry.has_file_modifications == flag)
            && self
                .model_id
                .as_ref()
                .is_none_or(|model| entry.model_id.as_ref() == Some(model))
    }
}

/// Persistent key/value storage provided by the host.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self.values.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values
            .lock()
            .map_err(|_| anyhow!("store lock poisoned"))?
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// A JSON object on disk, one property per key.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `$XDG_DATA_HOME/flexpilot/state.json`.
    pub fn in_data_dir() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::new();
        let path = xdg_dirs.place_data_file("flexpilot/state.json")?;
        Ok(Self::new(path))
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid state file {}", self.path.display()))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&values)?)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

pub struct SessionHistoryManager {
    store: Box<dyn KeyValueStore>,
    entries: Mutex<Vec<SessionHistoryEntry>>,
}

impl SessionHistoryManager {
    /// Loads any history already held by `store`. An unreadable history is
    /// logged and replaced by an empty one.
    pub fn new(store: Box<dyn KeyValueStore>) -> Result<Self> {
        let entries = match store.get(SESSION_HISTORY_KEY)? {
            Some(value) => match serde_json::from_value::<Vec<SessionHistoryEntry>>(value) {
                Ok(mut entries) => {
                    entries.truncate(MAX_ENTRIES);
                    entries
                }
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unreadable session history");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Ok(Self {
            store,
            entries: Mutex::new(entries),
        })
    }

    /// Prepends `entry`, dropping the oldest entries beyond the limit.
    pub fn add(&self, entry: SessionHistoryEntry) -> Result<()> {
        let mut entries = self.lock()?;
        tracing::debug!(id = %entry.id, kind = ?entry.kind, "recording session");
        let updated = std::iter::once(entry)
            .chain(entries.iter().cloned())
            .take(MAX_ENTRIES)
            .collect();
        self.commit(&mut entries, updated)
    }

    pub fn list(&self, filter: &HistoryFilter) -> Vec<SessionHistoryEntry> {
        self.lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| filter.matches(e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<SessionHistoryEntry> {
        self.lock().ok()?.iter().find(|e| e.id == id).cloned()
    }

    /// Returns whether an entry was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut entries = self.lock()?;
        let updated: Vec<_> = entries.iter().filter(|e| e.id != id).cloned().collect();
        if updated.len() == entries.len() {
            return Ok(false);
        }
        self.commit(&mut entries, updated)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        let mut entries = self.lock()?;
        self.commit(&mut entries, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `updated` to the store and only then replaces `entries`, so a
    /// failed write leaves the in-memory log untouched.
    fn commit(
        &self,
        entries: &mut Vec<SessionHistoryEntry>,
        updated: Vec<SessionHistoryEntry>,
    ) -> Result<()> {
        self.store
            .set(SESSION_HISTORY_KEY, serde_json::to_value(&updated)?)?;
        *entries = updated;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<SessionHistoryEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("session history lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::Builder;

    fn manager() -> SessionHistoryManager {
        SessionHistoryManager::new(Box::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn test_add_101_keeps_newest_100() {
        let history = manager();
        for i in 1..=101 {
            history
                .add(SessionHistoryEntry::new(SessionKind::Chat, format!("request {i}"), ""))
                .unwrap();
        }

        let entries = history.list(&HistoryFilter::default());
        assert_eq!(entries.len(), 100);
        assert_eq!(entries[0].request, "request 101");
        assert_eq!(entries[99].request, "request 2");
        assert!(!entries.iter().any(|e| e.request == "request 1"));
    }

    #[test]
    fn test_filter_by_every_field() {
        let history = manager();
        history
            .add(
                SessionHistoryEntry::new(SessionKind::Editing, "edit", "done")
                    .with_modified_files(vec!["a.rs".to_string()])
                    .with_model_id("gpt"),
            )
            .unwrap();
        history
            .add(SessionHistoryEntry::new(SessionKind::Editing, "edit 2", "nothing").with_model_id("claude"))
            .unwrap();
        history
            .add(SessionHistoryEntry::new(SessionKind::Chat, "chat", "hi"))
            .unwrap();

        let editing = HistoryFilter {
            kind: Some(SessionKind::Editing),
            ..HistoryFilter::default()
        };
        assert_eq!(history.list(&editing).len(), 2);

        let modified_by_gpt = HistoryFilter {
            kind: Some(SessionKind::Editing),
            has_file_modifications: Some(true),
            model_id: Some("gpt".to_string()),
        };
        let found = history.list(&modified_by_gpt);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].request, "edit");

        let no_match = HistoryFilter {
            kind: Some(SessionKind::Chat),
            model_id: Some("gpt".to_string()),
            ..HistoryFilter::default()
        };
        assert!(history.list(&no_match).is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let history = manager();
        let entry = SessionHistoryEntry::new(SessionKind::Chat, "q", "a");
        let id = entry.id.clone();
        history.add(entry).unwrap();
        history
            .add(SessionHistoryEntry::new(SessionKind::Chat, "q2", "a2"))
            .unwrap();

        assert!(history.remove(&id).unwrap());
        assert!(!history.remove(&id).unwrap());
        assert_eq!(history.len(), 1);
        assert!(history.get(&id).is_none());

        history.clear().unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_history_survives_reload_from_file_store() {
        let tmp_dir = Builder::new().prefix("test-history-").tempdir().unwrap();
        let path = tmp_dir.path().join("state.json");

        let history = SessionHistoryManager::new(Box::new(JsonFileStore::new(&path))).unwrap();
        history
            .add(
                SessionHistoryEntry::new(SessionKind::Editing, "rename", "ok")
                    .with_metadata("workingSet", json!(["src/lib.rs"])),
            )
            .unwrap();

        let reloaded = SessionHistoryManager::new(Box::new(JsonFileStore::new(&path))).unwrap();
        let entries = reloaded.list(&HistoryFilter::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request, "rename");
        assert_eq!(entries[0].metadata.as_ref().unwrap()["workingSet"], json!(["src/lib.rs"]));

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[SESSION_HISTORY_KEY][0]["type"], "editing");
        assert_eq!(raw[SESSION_HISTORY_KEY][0]["hasFileModifications"], false);
        assert!(raw[SESSION_HISTORY_KEY][0].get("modelId").is_none());
    }

    #[test]
    fn test_unreadable_history_starts_empty() {
        let store = MemoryStore::new();
        store.set(SESSION_HISTORY_KEY, json!({"not": "a list"})).unwrap();
        let history = SessionHistoryManager::new(Box::new(store)).unwrap();
        assert!(history.is_empty());
    }

    /// Accepts writes until `fail` is set.
    struct FlakyStore {
        inner: MemoryStore,
        fail: Arc<AtomicBool>,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: Value) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow!("disk full"));
            }
            self.inner.set(key, value)
        }
    }

    #[test]
    fn test_failed_write_leaves_history_unchanged() {
        let fail = Arc::new(AtomicBool::new(false));
        let history = SessionHistoryManager::new(Box::new(FlakyStore {
            inner: MemoryStore::new(),
            fail: fail.clone(),
        }))
        .unwrap();
        let entry = SessionHistoryEntry::new(SessionKind::Chat, "kept", "");
        let id = entry.id.clone();
        history.add(entry).unwrap();

        fail.store(true, Ordering::SeqCst);
        assert!(history.add(SessionHistoryEntry::new(SessionKind::Chat, "lost", "")).is_err());
        assert!(history.remove(&id).is_err());
        assert!(history.clear().is_err());

        let entries = history.list(&HistoryFilter::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request, "kept");
    }
}
