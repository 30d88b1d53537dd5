//! # Trace Arena
//!
//! The execution trace reconstructed from the notification stream.
//!
//! Scopes are stored in a flat arena and addressed by [`ScopeId`]. Ownership
//! is top-down (root task list → tasks → children); the `parent` link is a
//! plain id used for navigation only. The arena is append-only between
//! resets, so ids stay valid for the lifetime of a trace.

use crate::primitives::MAX_TRACE_DEPTH;
use crate::{DropReason, Message, ScopeId, ScopeKind, Status};
use serde::{Deserialize, Serialize};

// =============================================================================
// SCOPE
// =============================================================================

/// One node of the execution trace.
///
/// Besides the generic ordered `children`, some kinds use dedicated slots:
/// - `PipelineNode`: `reco` (its next lists) and `action`
/// - `RecognitionNode`: `reco_detail`
/// - `ActionNode`: `action`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub(crate) id: ScopeId,
    pub(crate) kind: ScopeKind,
    pub(crate) payload: Message,
    pub(crate) closing: Option<Message>,
    pub(crate) status: Status,
    pub(crate) parent: Option<ScopeId>,
    pub(crate) children: Vec<ScopeId>,
    pub(crate) reco: Vec<ScopeId>,
    pub(crate) action: Option<ScopeId>,
    pub(crate) reco_detail: Option<ScopeId>,
}

impl Scope {
    fn new(id: ScopeId, kind: ScopeKind, payload: Message, parent: Option<ScopeId>) -> Self {
        Self {
            id,
            kind,
            payload,
            closing: None,
            status: Status::Running,
            parent,
            children: Vec::new(),
            reco: Vec::new(),
            action: None,
            reco_detail: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// The `Starting` message that opened this scope.
    #[must_use]
    pub fn payload(&self) -> &Message {
        &self.payload
    }

    /// The terminal message that closed this scope, once received.
    #[must_use]
    pub fn closing(&self) -> Option<&Message> {
        self.closing.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[ScopeId] {
        &self.children
    }

    /// Next lists of a pipeline node, in arrival order.
    #[must_use]
    pub fn reco(&self) -> &[ScopeId] {
        &self.reco
    }

    #[must_use]
    pub fn action(&self) -> Option<ScopeId> {
        self.action
    }

    #[must_use]
    pub fn reco_detail(&self) -> Option<ScopeId> {
        self.reco_detail
    }

    /// Name reported by the engine, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.payload.name.as_deref()
    }

    /// Every owned child id, slots included, in a stable order.
    pub fn owned(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.reco
            .iter()
            .copied()
            .chain(self.action)
            .chain(self.reco_detail)
            .chain(self.children.iter().copied())
    }

    /// The child that receives the next message when descending the trace.
    ///
    /// - `PipelineNode`: the action slot if set, else the last next list
    /// - `RecognitionNode`: the recognition detail slot
    /// - `ActionNode`: the action slot
    /// - `NextList` / `Recognition` / `Action`: the last child
    #[must_use]
    pub fn open_child(&self) -> Option<ScopeId> {
        match self.kind {
            ScopeKind::PipelineNode => self.action.or_else(|| self.reco.last().copied()),
            ScopeKind::RecognitionNode => self.reco_detail,
            ScopeKind::ActionNode => self.action,
            ScopeKind::NextList | ScopeKind::Recognition | ScopeKind::Action => {
                self.children.last().copied()
            }
            ScopeKind::Task => self.children.last().copied(),
        }
    }
}

// =============================================================================
// TRACE
// =============================================================================

/// Where a newly opened scope is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attach {
    /// Appended to the root task list.
    Root,
    /// Appended to the parent's ordered children.
    Child(ScopeId),
    /// Appended to a pipeline node's next-list sequence.
    Reco(ScopeId),
    /// Stored in the parent's action slot.
    ActionSlot(ScopeId),
    /// Stored in a recognition node's detail slot.
    DetailSlot(ScopeId),
}

/// The root of the execution trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    scopes: Vec<Scope>,
    tasks: Vec<ScopeId>,
    depth: usize,
}

impl Trace {
    /// Create a new empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scopes open between the active task and the next tracker.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    /// Root task ids, oldest first.
    #[must_use]
    pub fn tasks(&self) -> &[ScopeId] {
        &self.tasks
    }

    /// Total number of scopes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Look up a scope by id.
    #[must_use]
    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.index())
    }

    /// All scopes in creation order.
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    /// The last root task, whatever its status.
    #[must_use]
    pub fn last_task(&self) -> Option<ScopeId> {
        self.tasks.last().copied()
    }

    /// The active task: the last root task, provided it is still running.
    #[must_use]
    pub fn active_task(&self) -> Option<ScopeId> {
        self.last_task()
            .filter(|id| self.scope(*id).is_some_and(|s| s.status == Status::Running))
    }

    /// Ancestors of a scope, nearest first.
    pub fn ancestors(&self, id: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(self.scope(id).and_then(|s| s.parent), move |current| {
            self.scope(*current).and_then(|s| s.parent)
        })
    }

    /// Resolve the tracker for the current depth.
    ///
    /// Starts at the most recent top-level pipeline node of the active task
    /// and descends `depth - 1` times along [`Scope::open_child`].
    pub fn resolve_tracker(&self) -> Result<ScopeId, DropReason> {
        let task = self.active_task().ok_or(DropReason::NoActiveTask)?;
        let mut tracker = self
            .scope(task)
            .and_then(|t| t.children.last().copied())
            .ok_or(DropReason::TraceExhausted)?;

        for _ in 1..self.depth {
            tracker = self
                .scope(tracker)
                .and_then(Scope::open_child)
                .ok_or(DropReason::TraceExhausted)?;
        }

        Ok(tracker)
    }

    /// Open a new running scope and attach it.
    pub(crate) fn open(&mut self, kind: ScopeKind, payload: Message, at: Attach) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        let parent = match at {
            Attach::Root => None,
            Attach::Child(p)
            | Attach::Reco(p)
            | Attach::ActionSlot(p)
            | Attach::DetailSlot(p) => Some(p),
        };
        self.scopes.push(Scope::new(id, kind, payload, parent));

        match at {
            Attach::Root => self.tasks.push(id),
            Attach::Child(p) => {
                if let Some(scope) = self.scopes.get_mut(p.index()) {
                    scope.children.push(id);
                }
            }
            Attach::Reco(p) => {
                if let Some(scope) = self.scopes.get_mut(p.index()) {
                    scope.reco.push(id);
                }
            }
            Attach::ActionSlot(p) => {
                if let Some(scope) = self.scopes.get_mut(p.index()) {
                    scope.action = Some(id);
                }
            }
            Attach::DetailSlot(p) => {
                if let Some(scope) = self.scopes.get_mut(p.index()) {
                    scope.reco_detail = Some(id);
                }
            }
        }

        id
    }

    /// Move a running scope to its terminal status.
    ///
    /// Returns `AlreadyTerminal` if the scope has already finished; the
    /// status of a scope changes at most once.
    pub(crate) fn close(&mut self, id: ScopeId, message: &Message) -> Result<(), DropReason> {
        let status = message
            .phase
            .terminal_status()
            .ok_or(DropReason::StructuralMismatch)?;
        let scope = self
            .scopes
            .get_mut(id.index())
            .ok_or(DropReason::TraceExhausted)?;
        if scope.status.is_terminal() {
            return Err(DropReason::AlreadyTerminal);
        }
        scope.status = status;
        scope.closing = Some(message.clone());
        Ok(())
    }

    /// Check the forest invariants of a trace built outside the reducer.
    ///
    /// Every id must be in range and match its arena slot, every non-root
    /// scope must be owned by exactly the parent it names, roots must be
    /// tasks without parents, and no scope may be reachable twice. No scope
    /// may sit more than [`MAX_TRACE_DEPTH`] levels below its task.
    pub fn validate(&self) -> Result<(), String> {
        if self.depth > MAX_TRACE_DEPTH {
            return Err(format!("depth {} exceeds {}", self.depth, MAX_TRACE_DEPTH));
        }
        let mut owner: Vec<Option<ScopeId>> = vec![None; self.scopes.len()];
        let mut seen_root = vec![false; self.scopes.len()];

        for (index, scope) in self.scopes.iter().enumerate() {
            if scope.id.index() != index {
                return Err(format!("scope {} stored at slot {}", scope.id, index));
            }
            for child in scope.owned() {
                let slot = owner
                    .get_mut(child.index())
                    .ok_or_else(|| format!("{} owns unknown scope {}", scope.id, child))?;
                if slot.is_some() {
                    return Err(format!("scope {} has more than one owner", child));
                }
                *slot = Some(scope.id);
            }
        }

        for task in &self.tasks {
            let scope = self
                .scope(*task)
                .ok_or_else(|| format!("unknown root task {}", task))?;
            if scope.kind != ScopeKind::Task || scope.parent.is_some() {
                return Err(format!("root {} is not a parentless task", task));
            }
            if std::mem::replace(&mut seen_root[task.index()], true) {
                return Err(format!("root {} listed twice", task));
            }
        }

        let mut level = vec![0usize; self.scopes.len()];
        for (index, scope) in self.scopes.iter().enumerate() {
            let expected = owner[index];
            if scope.parent != expected {
                return Err(format!("scope {} has inconsistent parent", scope.id));
            }
            if expected.is_none() && !seen_root[index] {
                return Err(format!("scope {} is detached", scope.id));
            }
            // Creation order is topological: owners always precede children.
            if let Some(parent) = expected {
                if parent >= scope.id {
                    return Err(format!("scope {} precedes its owner", scope.id));
                }
                level[index] = level[parent.index()] + 1;
                if level[index] > MAX_TRACE_DEPTH {
                    return Err(format!(
                        "scope {} nests deeper than {}",
                        scope.id, MAX_TRACE_DEPTH
                    ));
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
