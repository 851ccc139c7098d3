use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Most recent entries are kept; older ones fall off the end.
const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub text: String,
    pub timestamp: String,
}

/// Bounded, newest-first scan history persisted as a single JSON document.
/// A missing or unparsable file loads as an empty history.
pub struct HistoryStore {
    path: PathBuf,
    data: RwLock<Vec<HistoryEntry>>,
}

impl HistoryStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read history from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.data.read().unwrap().clone()
    }

    /// Prepends a new entry unless it repeats the current head. Suppression
    /// is adjacent-only; the same text may appear further down the list.
    pub fn append(&self, text: &str) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        if guard.first().is_some_and(|head| head.text == text) {
            return Ok(());
        }

        guard.insert(
            0,
            HistoryEntry {
                text: text.to_string(),
                timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            },
        );
        guard.truncate(HISTORY_LIMIT);
        self.persist(&guard)
    }

    pub fn clear(&self) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.clear();
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }

    fn persist(&self, data: &[HistoryEntry]) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write history to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn store_in(dir: &TempDir) -> HistoryStore {
        HistoryStore::new(dir.path().join("history.json")).unwrap()
    }

    #[test]
    fn adjacent_duplicates_are_suppressed() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append("A").unwrap();
        store.append("A").unwrap();
        assert_eq!(store.entries().len(), 1);

        store.append("B").unwrap();
        let texts: Vec<_> = store.entries().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, ["B", "A"]);
    }

    #[test]
    fn duplicates_are_allowed_when_not_adjacent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append("A").unwrap();
        store.append("B").unwrap();
        store.append("A").unwrap();
        let texts: Vec<_> = store.entries().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, ["A", "B", "A"]);
    }

    #[test]
    fn history_is_capped_at_fifty_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for i in 0..51 {
            store.append(&format!("scan-{i}")).unwrap();
        }

        let entries = store.entries();
        assert_eq!(entries.len(), 50);
        assert_eq!(entries[0].text, "scan-50");
        assert_eq!(entries[49].text, "scan-1");
    }

    #[test]
    fn entries_survive_a_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_in(&dir);
            store.append("persisted").unwrap();
        }

        let reopened = store_in(&dir);
        assert_eq!(reopened.entries()[0].text, "persisted");
    }

    #[test]
    fn malformed_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{not json").unwrap();

        let store = HistoryStore::new(path).unwrap();
        assert!(store.entries().is_empty());
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append("gone").unwrap();
        store.clear().unwrap();

        assert!(store.entries().is_empty());
        assert!(!dir.path().join("history.json").exists());
    }
}
