use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Deserializer, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::model::{List, ListId, Task};

/// Versioned storage key; the file backend stores `<key>.json`.
pub const STORAGE_KEY: &str = "todo_app_state_v1";

fn default_active_list_id() -> ListId {
    ListId::inbox()
}

fn active_list_id_or_inbox<'de, D>(deserializer: D) -> Result<ListId, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<ListId>::deserialize(deserializer)?;
    Ok(raw
        .filter(|id| !id.as_str().is_empty())
        .unwrap_or_else(ListId::inbox))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub lists: Vec<List>,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(
        default = "default_active_list_id",
        deserialize_with = "active_list_id_or_inbox"
    )]
    pub active_list_id: ListId,
}

impl Snapshot {
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("failed to serialize snapshot")
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("failed to parse snapshot")
    }
}

/// Load/save pair for whole-state snapshots. `load` never fails: a missing
/// or corrupt snapshot is reported as `None`.
pub trait Persistence {
    fn load(&self) -> Option<Snapshot>;
    fn save(&mut self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at `<data_dir>/todo_app_state_v1.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(format!("{STORAGE_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFileStorage {
    #[tracing::instrument(skip(self), fields(file = %self.path.display()))]
    fn load(&self) -> Option<Snapshot> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no snapshot on disk");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "failed reading snapshot; starting fresh");
                return None;
            }
        };

        match Snapshot::from_json(&raw) {
            Ok(snapshot) => {
                info!(
                    lists = snapshot.lists.len(),
                    tasks = snapshot.tasks.len(),
                    "loaded snapshot"
                );
                Some(snapshot)
            }
            Err(err) => {
                warn!(error = ?err, "snapshot is corrupt; starting fresh");
                None
            }
        }
    }

    #[tracing::instrument(skip(self, snapshot), fields(file = %self.path.display()))]
    fn save(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let serialized = snapshot.to_json()?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(serialized.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;

        debug!(bytes = serialized.len(), "saved snapshot");
        Ok(())
    }
}

/// Keeps the last saved snapshot as JSON text in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    raw: Option<String>,
    saves: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
            saves: 0,
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl Persistence for MemoryStorage {
    fn load(&self) -> Option<Snapshot> {
        let raw = self.raw.as_deref()?;
        match Snapshot::from_json(raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(error = ?err, "in-memory snapshot is corrupt");
                None
            }
        }
    }

    fn save(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        self.raw = Some(snapshot.to_json()?);
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;
    use crate::model::TaskId;

    #[test]
    fn decodes_camel_case_wire_format() {
        let raw = r#"{
            "lists": [{"id": "inbox", "name": "Inbox"}, {"id": "k3j9x0ab", "name": "Work"}],
            "tasks": [
                {"id": "t1", "title": "Ship", "done": false, "due": "2024-01-01T10:00", "listId": "k3j9x0ab"},
                {"id": "t2", "title": "Rest", "done": true, "due": null, "listId": "inbox"}
            ],
            "activeListId": "k3j9x0ab"
        }"#;

        let snapshot = Snapshot::from_json(raw).expect("parse snapshot");
        assert_eq!(snapshot.lists.len(), 2);
        assert_eq!(snapshot.active_list_id.as_str(), "k3j9x0ab");
        assert_eq!(snapshot.tasks[0].id, TaskId::from("t1"));
        assert_eq!(
            snapshot.tasks[0].due,
            NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(10, 0, 0))
        );
        assert!(snapshot.tasks[1].done);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let snapshot = Snapshot::from_json(
            r#"{"tasks": [{"id": "t1", "title": "Bare", "listId": "inbox"}], "activeListId": null}"#,
        )
        .expect("parse snapshot");
        assert!(snapshot.lists.is_empty());
        assert!(snapshot.active_list_id.is_inbox());
        assert!(!snapshot.tasks[0].done);
        assert_eq!(snapshot.tasks[0].due, None);
    }

    #[test]
    fn unparsable_due_decodes_as_none() {
        let snapshot = Snapshot::from_json(
            r#"{"tasks": [{"id": "t1", "title": "x", "due": "soonish", "listId": "inbox"}]}"#,
        )
        .expect("parse snapshot");
        assert_eq!(snapshot.tasks[0].due, None);
    }

    #[test]
    fn serializes_camel_case_with_null_due() {
        let snapshot = Snapshot {
            lists: vec![List::inbox()],
            tasks: vec![Task {
                id: TaskId::from("t1"),
                title: "Buy milk".to_string(),
                done: false,
                due: None,
                list_id: ListId::inbox(),
            }],
            active_list_id: ListId::inbox(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&snapshot.to_json().expect("serialize")).expect("json");
        assert_eq!(value["activeListId"], "inbox");
        assert_eq!(value["tasks"][0]["listId"], "inbox");
        assert!(value["tasks"][0]["due"].is_null());
    }

    #[test]
    fn file_storage_treats_missing_and_corrupt_as_absent() {
        let temp = tempdir().expect("tempdir");
        let storage = JsonFileStorage::in_dir(temp.path());
        assert!(storage.load().is_none());

        fs::write(storage.path(), "{not json").expect("write garbage");
        assert!(storage.load().is_none());
    }

    #[test]
    fn file_storage_saves_and_loads() {
        let temp = tempdir().expect("tempdir");
        let mut storage = JsonFileStorage::in_dir(&temp.path().join("nested"));
        let snapshot = Snapshot {
            lists: vec![List::inbox()],
            tasks: vec![],
            active_list_id: ListId::inbox(),
        };
        storage.save(&snapshot).expect("save");
        assert!(storage.path().ends_with("todo_app_state_v1.json"));
        assert_eq!(storage.load(), Some(snapshot));
    }

    #[test]
    fn memory_storage_counts_saves() {
        let mut storage = MemoryStorage::with_raw("garbage");
        assert!(storage.load().is_none());
        storage
            .save(&Snapshot {
                lists: vec![List::inbox()],
                tasks: vec![],
                active_list_id: ListId::inbox(),
            })
            .expect("save");
        assert_eq!(storage.save_count(), 1);
        assert!(storage.load().is_some());
    }
}
