use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::datetime::due_serde;

pub const INBOX_ID: &str = "inbox";
pub const INBOX_NAME: &str = "Inbox";
pub const UNTITLED_LIST_NAME: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListId(String);

impl ListId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn inbox() -> Self {
        Self(INBOX_ID.to_string())
    }

    pub fn is_inbox(&self) -> bool {
        self.0 == INBOX_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct List {
    pub id: ListId,
    pub name: String,
}

impl List {
    pub fn inbox() -> Self {
        Self {
            id: ListId::inbox(),
            name: INBOX_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default)]
    pub done: bool,

    #[serde(default, with = "due_serde")]
    pub due: Option<NaiveDateTime>,

    pub list_id: ListId,
}

/// Partial update for [`Task`]. `None` leaves a field untouched; `due` uses
/// `Some(None)` to clear the due date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub due: Option<Option<NaiveDateTime>>,
    pub done: Option<bool>,
    pub list_id: Option<ListId>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.due.is_none() && self.done.is_none() && self.list_id.is_none()
    }

    /// Builds the patch an editor should submit: only fields that differ from
    /// `task` survive, and a title that trims to nothing is dropped.
    pub fn diff_against(task: &Task, edited: TaskPatch) -> TaskPatch {
        let title = edited
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && *t != task.title);
        let due = edited.due.filter(|d| *d != task.due);
        let done = edited.done.filter(|d| *d != task.done);
        let list_id = edited.list_id.filter(|l| *l != task.list_id);

        TaskPatch {
            title,
            due,
            done,
            list_id,
        }
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(due) = self.due {
            task.due = due;
        }
        if let Some(done) = self.done {
            task.done = done;
        }
        if let Some(list_id) = self.list_id {
            task.list_id = list_id;
        }
    }
}
