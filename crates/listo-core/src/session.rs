use chrono::NaiveDateTime;
use tracing::{error, info};

use crate::ids::IdGenerator;
use crate::model::{ListId, TaskId, TaskPatch};
use crate::persist::Persistence;
use crate::store::{AppState, Store};

/// A [`Store`] bound to its persistence adapter. Every mutating call is
/// followed by exactly one save of the resulting state.
#[derive(Debug)]
pub struct Session<P: Persistence> {
    store: Store,
    storage: P,
    failed_saves: usize,
}

impl<P: Persistence> Session<P> {
    /// Starts from the persisted snapshot, or from the default state when
    /// none can be loaded.
    #[tracing::instrument(skip_all)]
    pub fn open(storage: P, ids: Box<dyn IdGenerator>) -> Self {
        let state = match storage.load() {
            Some(snapshot) => AppState::from_snapshot(snapshot),
            None => {
                info!("starting with default state");
                AppState::default()
            }
        };

        Self {
            store: Store::with_state(state, ids),
            storage,
            failed_saves: 0,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn storage(&self) -> &P {
        &self.storage
    }

    /// Number of saves that failed since the session opened.
    pub fn failed_saves(&self) -> usize {
        self.failed_saves
    }

    pub fn add_list(&mut self, name: &str) -> ListId {
        let id = self.store.add_list(name);
        self.commit();
        id
    }

    pub fn rename_list(&mut self, id: &ListId, name: &str) {
        self.store.rename_list(id, name);
        self.commit();
    }

    pub fn delete_list(&mut self, id: &ListId) {
        self.store.delete_list(id);
        self.commit();
    }

    pub fn add_task(&mut self, title: &str, due: Option<NaiveDateTime>) -> Option<TaskId> {
        let id = self.store.add_task(title, due);
        self.commit();
        id
    }

    pub fn toggle_task(&mut self, id: &TaskId) {
        self.store.toggle_task(id);
        self.commit();
    }

    pub fn delete_task(&mut self, id: &TaskId) {
        self.store.delete_task(id);
        self.commit();
    }

    pub fn edit_task(&mut self, id: &TaskId, patch: TaskPatch) {
        self.store.edit_task(id, patch);
        self.commit();
    }

    pub fn select_list(&mut self, id: ListId) {
        self.store.select_list(id);
        self.commit();
    }

    fn commit(&mut self) {
        let snapshot = self.store.snapshot();
        if let Err(err) = self.storage.save(&snapshot) {
            self.failed_saves += 1;
            error!(
                error = ?err,
                failed_saves = self.failed_saves,
                "failed to save snapshot; in-memory state kept"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::persist::{MemoryStorage, Snapshot};

    struct BrokenStorage;

    impl Persistence for BrokenStorage {
        fn load(&self) -> Option<Snapshot> {
            None
        }

        fn save(&mut self, _snapshot: &Snapshot) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("disk full"))
        }
    }

    fn ids() -> Box<dyn IdGenerator> {
        Box::new(SequentialIds::new("id"))
    }

    #[test]
    fn each_operation_saves_once() {
        let mut session = Session::open(MemoryStorage::new(), ids());
        let list = session.add_list("Work");
        let task = session.add_task("Plan", None).expect("task created");
        session.toggle_task(&task);
        session.rename_list(&list, "Office");
        session.select_list(ListId::inbox());
        session.add_task("", None);
        session.delete_task(&task);
        session.delete_list(&list);
        assert_eq!(session.storage().save_count(), 8);
    }

    #[test]
    fn saved_snapshot_matches_memory() {
        let mut session = Session::open(MemoryStorage::new(), ids());
        session.add_list("Work");
        session.add_task("Plan", None).expect("task created");
        let saved = session.storage().load().expect("saved snapshot");
        assert_eq!(saved, session.store().snapshot());
    }

    #[test]
    fn corrupt_storage_opens_default_state() {
        let session = Session::open(MemoryStorage::with_raw("{\"lists\": 7"), ids());
        assert_eq!(session.store().state(), &AppState::default());
    }

    #[test]
    fn failed_saves_do_not_lose_state() {
        let mut session = Session::open(BrokenStorage, ids());
        let id = session.add_task("Still here", None).expect("task created");
        assert_eq!(session.failed_saves(), 1);
        assert!(session.store().state().task(&id).is_some());
    }
}
