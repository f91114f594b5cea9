use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use deunicode::deunicode;
use tracing::{debug, warn};

use crate::ids::IdGenerator;
use crate::model::{INBOX_ID, List, ListId, Task, TaskId, TaskPatch, UNTITLED_LIST_NAME};
use crate::persist::Snapshot;

const MAX_PLAIN_ID_ATTEMPTS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub lists: Vec<List>,
    pub tasks: Vec<Task>,
    pub active_list_id: ListId,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            lists: vec![List::inbox()],
            tasks: vec![],
            active_list_id: ListId::inbox(),
        }
    }
}

impl AppState {
    /// Rebuilds state from a persisted snapshot, repairing anything that
    /// would break the list/task invariants: the inbox is restored, orphaned
    /// tasks are dropped and a dangling selection falls back to the inbox.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let Snapshot {
            mut lists,
            mut tasks,
            active_list_id,
        } = snapshot;

        if !lists.iter().any(|l| l.id.is_inbox()) {
            warn!("snapshot has no inbox list; restoring it");
            lists.insert(0, List::inbox());
        }

        let known: HashSet<&ListId> = lists.iter().map(|l| &l.id).collect();
        let before = tasks.len();
        tasks.retain(|t| known.contains(&t.list_id));
        if tasks.len() != before {
            warn!(
                dropped = before - tasks.len(),
                "dropped tasks referencing missing lists"
            );
        }

        let active_list_id = if known.contains(&active_list_id) {
            active_list_id
        } else {
            debug!(active = %active_list_id, "active list missing; selecting inbox");
            ListId::inbox()
        };

        Self {
            lists,
            tasks,
            active_list_id,
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            lists: self.lists.clone(),
            tasks: self.tasks.clone(),
            active_list_id: self.active_list_id.clone(),
        }
    }

    pub fn list(&self, id: &ListId) -> Option<&List> {
        self.lists.iter().find(|l| l.id == *id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *id)
    }
}

/// The list matching `active_list_id`, or the first list when the selection
/// dangles.
pub fn active_list(state: &AppState) -> Option<&List> {
    state
        .list(&state.active_list_id)
        .or_else(|| state.lists.first())
}

pub fn tasks_in_active_list(state: &AppState) -> Vec<&Task> {
    let Some(active) = active_list(state) else {
        return vec![];
    };
    state
        .tasks
        .iter()
        .filter(|t| t.list_id == active.id)
        .collect()
}

pub fn sorted_tasks(state: &AppState) -> Vec<&Task> {
    let mut rows = tasks_in_active_list(state);
    rows.sort_by(|a, b| compare_tasks(a, b));
    rows
}

/// Incomplete before complete, then earliest due first with undated tasks
/// last, then title.
pub fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    a.done
        .cmp(&b.done)
        .then_with(|| compare_due(a.due.as_ref(), b.due.as_ref()))
        .then_with(|| compare_titles(&a.title, &b.title))
}

fn compare_due(a: Option<&NaiveDateTime>, b: Option<&NaiveDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// Weighed level by level: character class (punctuation and symbols, then
// digits, then letters) with accents and case folded, then lowercase before
// uppercase, then the raw text.
fn compare_titles(a: &str, b: &str) -> Ordering {
    let folded_a = deunicode(a);
    let folded_b = deunicode(b);
    primary_weights(&folded_a)
        .cmp(primary_weights(&folded_b))
        .then_with(|| compare_case(&folded_a, &folded_b))
        .then_with(|| a.cmp(b))
}

fn primary_weights(s: &str) -> impl Iterator<Item = (u8, char)> + '_ {
    s.chars().map(|ch| {
        let class = if ch.is_alphabetic() {
            2
        } else if ch.is_numeric() {
            1
        } else {
            0
        };
        (class, ch.to_ascii_lowercase())
    })
}

fn compare_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .zip(b.chars())
        .find_map(|(x, y)| {
            if x.is_lowercase() && y.is_uppercase() {
                Some(Ordering::Less)
            } else if x.is_uppercase() && y.is_lowercase() {
                Some(Ordering::Greater)
            } else {
                None
            }
        })
        .unwrap_or(Ordering::Equal)
}

pub struct Store {
    state: AppState,
    ids: Box<dyn IdGenerator>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Store {
    pub fn new(ids: Box<dyn IdGenerator>) -> Self {
        Self::with_state(AppState::default(), ids)
    }

    pub fn with_state(state: AppState, ids: Box<dyn IdGenerator>) -> Self {
        Self { state, ids }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn lists(&self) -> &[List] {
        &self.state.lists
    }

    pub fn tasks(&self) -> &[Task] {
        &self.state.tasks
    }

    pub fn active_list_id(&self) -> &ListId {
        &self.state.active_list_id
    }

    pub fn active_list(&self) -> Option<&List> {
        active_list(&self.state)
    }

    pub fn tasks_in_active_list(&self) -> Vec<&Task> {
        tasks_in_active_list(&self.state)
    }

    pub fn sorted_tasks(&self) -> Vec<&Task> {
        sorted_tasks(&self.state)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.to_snapshot()
    }

    pub fn add_list(&mut self, name: &str) -> ListId {
        let trimmed = name.trim();
        let name = if trimmed.is_empty() {
            UNTITLED_LIST_NAME
        } else {
            trimmed
        };

        let lists = &self.state.lists;
        let id = ListId::new(fresh_id(self.ids.as_mut(), |candidate| {
            lists.iter().any(|l| l.id.as_str() == candidate)
        }));

        self.state.lists.push(List {
            id: id.clone(),
            name: name.to_string(),
        });
        self.state.active_list_id = id.clone();
        debug!(list = %id, name, "added list");
        id
    }

    pub fn rename_list(&mut self, id: &ListId, name: &str) {
        if let Some(list) = self.state.lists.iter_mut().find(|l| l.id == *id) {
            list.name = name.to_string();
            debug!(list = %id, name, "renamed list");
        }
    }

    pub fn delete_list(&mut self, id: &ListId) {
        if id.is_inbox() {
            debug!("refusing to delete inbox");
            return;
        }
        let Some(idx) = self.state.lists.iter().position(|l| l.id == *id) else {
            return;
        };

        self.state.lists.remove(idx);
        let before = self.state.tasks.len();
        self.state.tasks.retain(|t| t.list_id != *id);
        if self.state.active_list_id == *id {
            self.state.active_list_id = ListId::inbox();
        }
        debug!(
            list = %id,
            removed_tasks = before - self.state.tasks.len(),
            "deleted list"
        );
    }

    /// Returns `None` when the title is blank after trimming.
    pub fn add_task(&mut self, title: &str, due: Option<NaiveDateTime>) -> Option<TaskId> {
        let title = title.trim();
        if title.is_empty() {
            debug!("rejected task with empty title");
            return None;
        }

        let list_id = self
            .active_list()
            .map(|l| l.id.clone())
            .unwrap_or_else(ListId::inbox);

        let tasks = &self.state.tasks;
        let id = TaskId::new(fresh_id(self.ids.as_mut(), |candidate| {
            tasks.iter().any(|t| t.id.as_str() == candidate)
        }));

        self.state.tasks.insert(
            0,
            Task {
                id: id.clone(),
                title: title.to_string(),
                done: false,
                due,
                list_id: list_id.clone(),
            },
        );
        debug!(task = %id, list = %list_id, "added task");
        Some(id)
    }

    pub fn toggle_task(&mut self, id: &TaskId) {
        if let Some(task) = self.task_mut(id) {
            task.done = !task.done;
        }
    }

    pub fn delete_task(&mut self, id: &TaskId) {
        self.state.tasks.retain(|t| t.id != *id);
    }

    /// Merges `patch` into the task. A `list_id` naming no existing list is
    /// ignored.
    pub fn edit_task(&mut self, id: &TaskId, mut patch: TaskPatch) {
        if let Some(target) = patch.list_id.as_ref()
            && self.state.list(target).is_none()
        {
            warn!(task = %id, list = %target, "ignoring move to unknown list");
            patch.list_id = None;
        }

        if let Some(task) = self.task_mut(id) {
            patch.apply(task);
        }
    }

    /// Tolerates ids that name no list; the active-list view falls back to
    /// the first list.
    pub fn select_list(&mut self, id: ListId) {
        self.state.active_list_id = id;
    }

    fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.state.tasks.iter_mut().find(|t| t.id == *id)
    }
}

fn fresh_id(ids: &mut dyn IdGenerator, taken: impl Fn(&str) -> bool) -> String {
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        let mut candidate = ids.generate();
        if attempt > MAX_PLAIN_ID_ATTEMPTS {
            candidate = format!("{candidate}-{attempt}");
        }
        if !candidate.is_empty() && candidate != INBOX_ID && !taken(&candidate) {
            return candidate;
        }
        debug!(candidate = %candidate, attempt, "generated id already taken");
    }
}
