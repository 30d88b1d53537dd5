//! # Reducer Module
//!
//! Folds one [`Message`] at a time into the [`Trace`].
//!
//! The engine reports a flat, interleaved stream of `Starting` / `Succeeded`
//! / `Failed` notifications. The reducer rebuilds the nesting they imply:
//! `depth` counts the scopes open below the active task, and every non-task
//! message is applied to the *tracker*, the scope reached by descending
//! `depth - 1` levels from the latest top-level pipeline node.
//!
//! ## Transition table
//!
//! | Message | Required tracker | Effect | Δdepth |
//! |---------|------------------|--------|--------|
//! | `PipelineNode.Starting` | `Recognition` / `Action` | push child | +1 |
//! | `RecognitionNode.Starting` | `Recognition` / `Action` | push child | +1 |
//! | `ActionNode.Starting` | `Recognition` / `Action` | push child | +1 |
//! | `NextList.Starting` | `PipelineNode` | append to reco sequence | +1 |
//! | `Recognition.Starting` | `RecognitionNode` / `NextList` | detail slot / child | +1 |
//! | `Action.Starting` | `PipelineNode` / `ActionNode` | action slot | +1 |
//! | `X.Succeeded` / `X.Failed` | `X` | close | −1 |
//! | `RecognitionNode` terminal | open detail `Recognition` | close the node | −2 |
//!
//! Messages that match no transition are dropped: trace and index are left
//! exactly as they were. So is any `Starting` message arriving once `depth`
//! has reached [`MAX_TRACE_DEPTH`].

use crate::nested::NestedRecognitionIndex;
use crate::primitives::MAX_TRACE_DEPTH;
use crate::trace::{Attach, Scope, Trace};
use crate::{DropReason, Message, Phase, ScopeId, ScopeKind};
use serde::{Deserialize, Serialize};

/// Result of applying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// A new scope was created.
    Opened(ScopeId),
    /// An existing scope reached its terminal status.
    Closed(ScopeId),
    /// The message matched no transition.
    Dropped(DropReason),
}

impl Outcome {
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped(_))
    }

    #[must_use]
    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            Self::Dropped(reason) => Some(*reason),
            _ => None,
        }
    }

    /// The scope the message created or closed.
    #[must_use]
    pub fn scope(&self) -> Option<ScopeId> {
        match self {
            Self::Opened(id) | Self::Closed(id) => Some(*id),
            Self::Dropped(_) => None,
        }
    }
}

/// The Reducer applies the transition table.
pub struct Reducer;

impl Reducer {
    /// Apply one message to the trace, consulting the nested index.
    ///
    /// Never panics and never returns an error: a message that cannot be
    /// applied is logged and reported as [`Outcome::Dropped`].
    pub fn apply(
        trace: &mut Trace,
        index: &mut NestedRecognitionIndex,
        message: &Message,
    ) -> Outcome {
        match Self::transition(trace, index, message) {
            Ok(outcome) => outcome,
            Err(reason) => {
                tracing::warn!(%message, %reason, depth = trace.depth(), "drop msg");
                Outcome::Dropped(reason)
            }
        }
    }

    fn transition(
        trace: &mut Trace,
        index: &mut NestedRecognitionIndex,
        message: &Message,
    ) -> Result<Outcome, DropReason> {
        match (message.kind, message.phase) {
            (ScopeKind::Task, Phase::Starting) => {
                let id = trace.open(ScopeKind::Task, message.clone(), Attach::Root);
                trace.set_depth(0);
                index.reset_nesting();
                Ok(Outcome::Opened(id))
            }
            (ScopeKind::Task, _) => {
                let task = trace.last_task().ok_or(DropReason::NoActiveTask)?;
                trace.close(task, message)?;
                Ok(Outcome::Closed(task))
            }
            _ => Self::structural(trace, index, message),
        }
    }

    /// Apply a non-task message below the active task.
    fn structural(
        trace: &mut Trace,
        index: &mut NestedRecognitionIndex,
        message: &Message,
    ) -> Result<Outcome, DropReason> {
        let task = trace.active_task().ok_or(DropReason::NoActiveTask)?;
        let depth = trace.depth();

        if message.phase == Phase::Starting && depth >= MAX_TRACE_DEPTH {
            return Err(DropReason::DepthLimitExceeded);
        }

        if depth == 0 {
            if message.kind != ScopeKind::PipelineNode || message.phase != Phase::Starting {
                return Err(DropReason::TraceExhausted);
            }
            let id = trace.open(ScopeKind::PipelineNode, message.clone(), Attach::Child(task));
            trace.set_depth(1);
            return Ok(Outcome::Opened(id));
        }

        if message.kind == ScopeKind::Recognition && message.is_terminal() && index.is_nested() {
            if let Some(reco_id) = message.id {
                return Self::close_by_reco_id(trace, index, message, reco_id);
            }
        }

        let tracker_id = trace.resolve_tracker()?;
        let tracker = trace.scope(tracker_id).ok_or(DropReason::TraceExhausted)?;
        let tracker_kind = tracker.kind();

        match (message.kind, message.phase) {
            (
                ScopeKind::PipelineNode | ScopeKind::RecognitionNode | ScopeKind::ActionNode,
                Phase::Starting,
            ) => {
                if !matches!(tracker_kind, ScopeKind::Recognition | ScopeKind::Action) {
                    return Err(DropReason::StructuralMismatch);
                }
                let id = trace.open(message.kind, message.clone(), Attach::Child(tracker_id));
                trace.set_depth(depth + 1);
                if message.kind == ScopeKind::RecognitionNode {
                    index.enter_node(id);
                }
                Ok(Outcome::Opened(id))
            }

            (ScopeKind::NextList, Phase::Starting) => {
                // Next lists precede the action; once it exists they could not be reached.
                if tracker_kind != ScopeKind::PipelineNode || tracker.action().is_some() {
                    return Err(DropReason::StructuralMismatch);
                }
                let id = trace.open(ScopeKind::NextList, message.clone(), Attach::Reco(tracker_id));
                trace.set_depth(depth + 1);
                Ok(Outcome::Opened(id))
            }

            (ScopeKind::Recognition, Phase::Starting) => {
                let attach = match tracker_kind {
                    ScopeKind::RecognitionNode if tracker.reco_detail().is_none() => {
                        Attach::DetailSlot(tracker_id)
                    }
                    ScopeKind::NextList => Attach::Child(tracker_id),
                    // Recognition invoked from inside a custom recognizer.
                    ScopeKind::Recognition
                        if index.is_nested() && index.top() == Some(tracker_id) =>
                    {
                        Attach::Child(tracker_id)
                    }
                    _ => return Err(DropReason::StructuralMismatch),
                };
                let id = trace.open(ScopeKind::Recognition, message.clone(), attach);
                trace.set_depth(depth + 1);
                if let Some(reco_id) = message.id {
                    index.register(reco_id, id);
                }
                if index.is_nested() {
                    index.push_recognition(id);
                }
                Ok(Outcome::Opened(id))
            }

            (ScopeKind::Action, Phase::Starting) => {
                if !matches!(tracker_kind, ScopeKind::PipelineNode | ScopeKind::ActionNode)
                    || tracker.action().is_some()
                {
                    return Err(DropReason::StructuralMismatch);
                }
                let id = trace.open(
                    ScopeKind::Action,
                    message.clone(),
                    Attach::ActionSlot(tracker_id),
                );
                trace.set_depth(depth + 1);
                Ok(Outcome::Opened(id))
            }

            (ScopeKind::RecognitionNode, Phase::Succeeded | Phase::Failed) => {
                match tracker_kind {
                    ScopeKind::RecognitionNode => {
                        trace.close(tracker_id, message)?;
                        trace.set_depth(depth - 1);
                        index.leave_node(tracker_id);
                        Ok(Outcome::Closed(tracker_id))
                    }
                    ScopeKind::Recognition => {
                        Self::close_node_over_open_detail(trace, index, message, tracker_id)
                    }
                    _ => Err(DropReason::StructuralMismatch),
                }
            }

            (kind, Phase::Succeeded | Phase::Failed) => {
                if tracker_kind != kind {
                    return Err(DropReason::StructuralMismatch);
                }
                trace.close(tracker_id, message)?;
                trace.set_depth(depth - 1);
                if kind == ScopeKind::Recognition {
                    index.remove(tracker_id);
                }
                Ok(Outcome::Closed(tracker_id))
            }

            (ScopeKind::Task, Phase::Starting) => Err(DropReason::StructuralMismatch),
        }
    }

    /// Close a recognition found through its engine id.
    ///
    /// Depth only moves when the recognition is the current tracker; a
    /// recognition off the open path just takes its terminal status.
    fn close_by_reco_id(
        trace: &mut Trace,
        index: &mut NestedRecognitionIndex,
        message: &Message,
        reco_id: i64,
    ) -> Result<Outcome, DropReason> {
        let scope_id = index.lookup(reco_id).ok_or(DropReason::TraceExhausted)?;
        let on_path = trace.resolve_tracker().ok() == Some(scope_id);

        trace.close(scope_id, message)?;
        index.remove(scope_id);
        if on_path {
            trace.set_depth(trace.depth().saturating_sub(1));
        }
        Ok(Outcome::Closed(scope_id))
    }

    /// `RecognitionNode` terminal whose detail recognition never closed.
    ///
    /// The engine can finish a recognition node without reporting the
    /// terminal of the recognition in its detail slot. The node is closed,
    /// the recognition stays running (a late terminal is still matched by
    /// id) and depth moves past both.
    fn close_node_over_open_detail(
        trace: &mut Trace,
        index: &mut NestedRecognitionIndex,
        message: &Message,
        detail_id: ScopeId,
    ) -> Result<Outcome, DropReason> {
        let node_id = trace
            .scope(detail_id)
            .and_then(Scope::parent)
            .ok_or(DropReason::StructuralMismatch)?;
        let node = trace.scope(node_id).ok_or(DropReason::StructuralMismatch)?;
        if node.kind() != ScopeKind::RecognitionNode || node.reco_detail() != Some(detail_id) {
            return Err(DropReason::StructuralMismatch);
        }

        trace.close(node_id, message)?;
        trace.set_depth(trace.depth().saturating_sub(2));
        index.leave_node(node_id);
        tracing::debug!(node = %node_id, detail = %detail_id, "closed recognition node over open detail");
        Ok(Outcome::Closed(node_id))
    }
}

// =============================================================================
// TESTS
// =============================================================================
