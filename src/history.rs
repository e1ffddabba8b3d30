//! Project history: the last few plans, finished or not.
//!
//! An ordered list, newest first, capped at [`HISTORY_CAP`] entries and
//! upserted by plan identifier so re-saving a plan never duplicates it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::Plan;
use crate::storage::{Storage, StorageError};

/// Maximum number of retained history entries; the oldest is evicted first.
pub const HISTORY_CAP: usize = 10;

const HISTORY_KEY: &str = "history";

/// Errors from history operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("History record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// One saved project: the plan plus the stitched output, once it exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub plan: Plan,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// History list over an injected [`Storage`] backend.
pub struct History<S: Storage> {
    storage: S,
}

impl<S: Storage> History<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// All entries, newest first.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        match self.storage.get(HISTORY_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Look up an entry by plan id.
    pub fn find(&self, id: Uuid) -> Result<Option<HistoryEntry>, HistoryError> {
        Ok(self.entries()?.into_iter().find(|e| e.plan.id == id))
    }

    /// Insert or replace the entry for this plan.
    ///
    /// An existing entry with the same plan id is replaced in place; a new
    /// plan is prepended and the list truncated to [`HISTORY_CAP`].
    pub fn upsert(&self, plan: &Plan, output: Option<PathBuf>) -> Result<(), HistoryError> {
        let mut entries = self.entries()?;
        let entry = HistoryEntry {
            plan: plan.clone(),
            output,
        };
        match entries.iter().position(|e| e.plan.id == plan.id) {
            Some(idx) => entries[idx] = entry,
            None => {
                entries.insert(0, entry);
                entries.truncate(HISTORY_CAP);
            }
        }
        self.save(&entries)
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        let raw = serde_json::to_string(entries)?;
        Ok(self.storage.put(HISTORY_KEY, &raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Scene;
    use crate::storage::MemoryStorage;

    fn plan(title: &str) -> Plan {
        Plan::new(
            title.to_string(),
            vec![Scene::new(1, "s".into(), "p".into())],
        )
    }

    #[test]
    fn test_empty_history() {
        let history = History::new(MemoryStorage::new());
        assert!(history.entries().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_prepends_newest_first() {
        let history = History::new(MemoryStorage::new());
        history.upsert(&plan("first"), None).unwrap();
        history.upsert(&plan("second"), None).unwrap();
        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].plan.title, "second");
        assert_eq!(entries[1].plan.title, "first");
    }

    #[test]
    fn test_upsert_replaces_in_place_by_id() {
        let history = History::new(MemoryStorage::new());
        let a = plan("a");
        history.upsert(&a, None).unwrap();
        history.upsert(&plan("b"), None).unwrap();

        // Re-saving plan `a` with an output replaces its entry where it
        // sits instead of appending a duplicate.
        history.upsert(&a, Some(PathBuf::from("/out/a.mp4"))).unwrap();
        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].plan.title, "b");
        assert_eq!(entries[1].plan.id, a.id);
        assert_eq!(entries[1].output, Some(PathBuf::from("/out/a.mp4")));
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let history = History::new(MemoryStorage::new());
        let mut ids = Vec::new();
        for i in 0..12 {
            let p = plan(&format!("plan {}", i));
            ids.push(p.id);
            history.upsert(&p, None).unwrap();
        }
        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), HISTORY_CAP);
        // Newest survives, the two oldest are gone.
        assert_eq!(entries[0].plan.id, ids[11]);
        assert!(entries.iter().all(|e| e.plan.id != ids[0]));
        assert!(entries.iter().all(|e| e.plan.id != ids[1]));
    }

    #[test]
    fn test_find_by_id() {
        let history = History::new(MemoryStorage::new());
        let p = plan("target");
        history.upsert(&p, None).unwrap();
        history.upsert(&plan("other"), None).unwrap();
        let found = history.find(p.id).unwrap().unwrap();
        assert_eq!(found.plan.title, "target");
        assert!(history.find(Uuid::new_v4()).unwrap().is_none());
    }
}
