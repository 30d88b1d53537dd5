//! # Message Record
//!
//! The compact, owned form of one engine notification.
//!
//! A `Message` holds no reference into engine memory and no engine object
//! model: it can cross threads freely and is the only input the reducer
//! understands.

use crate::{Phase, ScopeKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized lifecycle notification.
///
/// Which optional fields are populated depends on `kind`:
///
/// | kind | fields |
/// |------|--------|
/// | `Task` | `entry`, `id` (task id), `uuid` |
/// | `PipelineNode` / `RecognitionNode` / `ActionNode` | `name`, `id` (node id) |
/// | `NextList` | `name`, `next_list` |
/// | `Recognition` | `name`, `id` (recognition id) |
/// | `Action` | `name`, `id` (action id) |
///
/// `task_id` carries the owning task for non-task kinds when the engine
/// reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: ScopeKind,
    pub phase: Phase,
    pub name: Option<String>,
    pub id: Option<i64>,
    pub task_id: Option<i64>,
    pub entry: Option<String>,
    pub uuid: Option<String>,
    pub next_list: Vec<String>,
}

impl Message {
    /// Create a bare message with no payload fields.
    #[must_use]
    pub fn new(kind: ScopeKind, phase: Phase) -> Self {
        Self {
            kind,
            phase,
            name: None,
            id: None,
            task_id: None,
            entry: None,
            uuid: None,
            next_list: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_task_id(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    #[must_use]
    pub fn with_next_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_list = names.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this message closes a scope.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self.phase, Phase::Starting)
    }

    /// Human-readable label: the name, or the task entry, or the kind.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.entry.as_deref())
            .unwrap_or(self.kind.wire_name())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.wire_name(), self.phase.wire_name())?;
        match (&self.name, self.id) {
            (Some(name), Some(id)) => write!(f, "({name}, {id})"),
            (Some(name), None) => write!(f, "({name})"),
            (None, Some(id)) => write!(f, "({id})"),
            (None, None) => Ok(()),
        }
    }
}
