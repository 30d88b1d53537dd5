//! # Normalizer Module
//!
//! Converts raw engine callbacks into typed [`Message`] records.
//!
//! - Accept the engine's namespaced names (`Tasker.Task.*`, `Node.*.*`) and
//!   the bare form (`Task.*`, `PipelineNode.*`)
//! - Reject names outside the closed kind set
//! - Reject payloads whose fields have the wrong JSON type or exceed limits
//! - Never panic, never interpret pipeline semantics

use crate::primitives::{MAX_NAME_LENGTH, MAX_NEXT_LIST_LENGTH};
use crate::{DropReason, Message, Phase, ScopeKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Namespace prefixes the engine puts in front of notification names.
const NAMESPACE_PREFIXES: [&str; 2] = ["Tasker.", "Node."];

/// A notification exactly as the engine callback delivers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNotification {
    /// Notification name, e.g. `Node.Recognition.Starting`.
    pub msg: String,
    /// Opaque detail object.
    #[serde(default)]
    pub details: Value,
}

impl RawNotification {
    #[must_use]
    pub fn new(msg: impl Into<String>, details: Value) -> Self {
        Self {
            msg: msg.into(),
            details,
        }
    }
}

/// The Normalizer turns raw callbacks into messages.
pub struct Normalizer;

impl Normalizer {
    /// Split a notification name into kind and phase.
    pub fn parse_name(msg: &str) -> Result<(ScopeKind, Phase), DropReason> {
        let bare = NAMESPACE_PREFIXES
            .iter()
            .find_map(|prefix| msg.strip_prefix(prefix))
            .unwrap_or(msg);

        let mut parts = bare.split('.');
        let (Some(kind), Some(phase), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(DropReason::UnknownMessageKind);
        };

        let kind = ScopeKind::from_wire_name(kind).ok_or(DropReason::UnknownMessageKind)?;
        let phase = Phase::from_wire_name(phase).ok_or(DropReason::UnknownMessageKind)?;
        Ok((kind, phase))
    }

    /// Normalize a raw notification.
    ///
    /// Returns the drop reason when the notification cannot be represented.
    pub fn normalize(raw: &RawNotification) -> Result<Message, DropReason> {
        let (kind, phase) = Self::parse_name(&raw.msg)?;

        let empty = Map::new();
        let details = match &raw.details {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(DropReason::MalformedNotification),
        };

        let mut message = Message::new(kind, phase);
        message.name = string_field(details, "name")?;

        match kind {
            ScopeKind::Task => {
                message.id = int_field(details, "task_id")?;
                message.entry = string_field(details, "entry")?;
                message.uuid = string_field(details, "uuid")?;
            }
            ScopeKind::PipelineNode | ScopeKind::RecognitionNode | ScopeKind::ActionNode => {
                message.id = int_field(details, "node_id")?;
                message.task_id = int_field(details, "task_id")?;
            }
            ScopeKind::NextList => {
                message.next_list = next_list_field(details)?;
                message.task_id = int_field(details, "task_id")?;
            }
            ScopeKind::Recognition => {
                message.id = int_field(details, "reco_id")?;
                message.task_id = int_field(details, "task_id")?;
            }
            ScopeKind::Action => {
                message.id = int_field(details, "action_id")?;
                message.task_id = int_field(details, "task_id")?;
            }
        }

        Ok(message)
    }

    /// Normalize, logging a diagnostic instead of returning the reason.
    pub fn accept(raw: &RawNotification) -> Option<Message> {
        match Self::normalize(raw) {
            Ok(message) => Some(message),
            Err(reason) => {
                tracing::warn!(msg = %raw.msg, %reason, "dropping notification");
                None
            }
        }
    }
}

// =============================================================================
// FIELD DECODING
// =============================================================================

fn string_field(details: &Map<String, Value>, key: &str) -> Result<Option<String>, DropReason> {
    match details.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.len() <= MAX_NAME_LENGTH => Ok(Some(s.clone())),
        Some(_) => Err(DropReason::MalformedNotification),
    }
}

fn int_field(details: &Map<String, Value>, key: &str) -> Result<Option<i64>, DropReason> {
    match details.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or(DropReason::MalformedNotification),
    }
}

/// Read the candidate list from `list` (engine name) or `next_list`.
///
/// Entries are either plain names or objects carrying a `name`.
fn next_list_field(details: &Map<String, Value>) -> Result<Vec<String>, DropReason> {
    let raw = match details.get("list").or_else(|| details.get("next_list")) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(DropReason::MalformedNotification),
    };

    if raw.len() > MAX_NEXT_LIST_LENGTH {
        return Err(DropReason::MalformedNotification);
    }

    raw.iter()
        .map(|item| {
            let name = match item {
                Value::String(s) => Some(s),
                Value::Object(entry) => match entry.get("name") {
                    Some(Value::String(s)) => Some(s),
                    _ => None,
                },
                _ => None,
            };
            match name {
                Some(s) if s.len() <= MAX_NAME_LENGTH => Ok(s.clone()),
                _ => Err(DropReason::MalformedNotification),
            }
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
