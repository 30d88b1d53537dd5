//! # Trace Store
//!
//! Owns one trace and serializes everything that touches it.
//!
//! A single mutex guards the trace, the nested-recognition index, the
//! revision counter, the drop log and the subscriber registry. `dispatch`,
//! `reset` and the subscriber fan-out that follows each of them run under
//! that lock, so a reset can never interleave with a partially applied
//! message and subscribers always observe events in application order.
//! `subscribe` and `unsubscribe` take the same lock: once `unsubscribe`
//! returns, the subscriber is not running and will not be called again.
//!
//! Subscribers must not call back into the store from their callback,
//! unsubscribing included.

use crate::export::{ScopeSnapshot, TraceSnapshot};
use crate::metrics::TraceMetrics;
use crate::nested::NestedRecognitionIndex;
use crate::primitives::MAX_DROP_RECORDS;
use crate::reducer::{Outcome, Reducer};
use crate::trace::Trace;
use crate::{DropReason, Message};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;

// =============================================================================
// EVENTS & SUBSCRIBERS
// =============================================================================

/// What a subscriber is told after each serialized operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent<'a> {
    /// A message went through the reducer (dropped messages included).
    Applied {
        message: &'a Message,
        outcome: Outcome,
        revision: u64,
    },
    /// The trace was discarded.
    Reset { revision: u64 },
}

impl StoreEvent<'_> {
    #[must_use]
    pub fn revision(&self) -> u64 {
        match self {
            Self::Applied { revision, .. } | Self::Reset { revision } => *revision,
        }
    }
}

/// Failure reported by a subscriber. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives store events together with a read view of the trace.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, trace: &Trace, event: &StoreEvent<'_>) -> Result<(), SubscriberError>;
}

impl<F> Subscriber for F
where
    F: Fn(&Trace, &StoreEvent<'_>) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_event(&self, trace: &Trace, event: &StoreEvent<'_>) -> Result<(), SubscriberError> {
        self(trace, event)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<(u64, Box<dyn Subscriber>)>,
}

impl Registry {
    fn add(&mut self, subscriber: Box<dyn Subscriber>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, subscriber));
        id
    }

    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Deliver `event` to every subscriber, isolating failures and panics.
    fn fan_out(&self, trace: &Trace, event: &StoreEvent<'_>) {
        for (id, subscriber) in &self.entries {
            match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(trace, event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(subscriber = *id, error = %e, "subscriber failed");
                }
                Err(_) => {
                    tracing::error!(subscriber = *id, "subscriber panicked");
                }
            }
        }
    }
}

type SharedState = Arc<Mutex<StoreState>>;

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle returned by [`TraceStore::subscribe`].
///
/// Dropping the handle leaves the subscriber registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    state: Weak<Mutex<StoreState>>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the subscriber. Returns `false` if it was already gone.
    ///
    /// Blocks until any fan-out in progress has finished.
    pub fn unsubscribe(self) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        lock(&state).subscribers.remove(self.id)
    }
}

// =============================================================================
// DROP LOG
// =============================================================================

/// A message the reducer could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropRecord {
    /// Sequence number, monotonic for the lifetime of the store.
    pub seq: u64,
    /// Revision produced by the dispatch that dropped the message.
    pub revision: u64,
    pub reason: DropReason,
    pub message: Message,
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Default)]
struct StoreState {
    trace: Trace,
    index: NestedRecognitionIndex,
    revision: u64,
    drops: VecDeque<DropRecord>,
    next_drop_seq: u64,
    subscribers: Registry,
}

impl StoreState {
    fn record_drop(&mut self, reason: DropReason, message: &Message) {
        if self.drops.len() >= MAX_DROP_RECORDS {
            self.drops.pop_front();
        }
        self.drops.push_back(DropRecord {
            seq: self.next_drop_seq,
            revision: self.revision,
            reason,
            message: message.clone(),
        });
        self.next_drop_seq += 1;
    }
}

/// The single owner of a live trace.
///
/// Construct one per debugging session and share it behind an `Arc`.
#[derive(Default)]
pub struct TraceStore {
    state: SharedState,
}

impl TraceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        lock(&self.state)
    }

    /// Apply one message and notify subscribers.
    pub fn dispatch(&self, message: &Message) -> Outcome {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        let outcome = Reducer::apply(&mut state.trace, &mut state.index, message);
        state.revision += 1;
        if let Outcome::Dropped(reason) = outcome {
            state.record_drop(reason, message);
        }

        let event = StoreEvent::Applied {
            message,
            outcome,
            revision: state.revision,
        };
        state.subscribers.fan_out(&state.trace, &event);
        outcome
    }

    /// Discard the trace, the nested index and the drop log.
    pub fn reset(&self) {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        state.trace = Trace::new();
        state.index.clear();
        state.drops.clear();
        state.revision += 1;
        tracing::info!(revision = state.revision, "trace reset");

        let event = StoreEvent::Reset {
            revision: state.revision,
        };
        state.subscribers.fan_out(&state.trace, &event);
    }

    /// Register a subscriber for all future events.
    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) -> Subscription {
        let id = self.lock_state().subscribers.add(Box::new(subscriber));
        Subscription {
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Register a closure subscriber.
    pub fn subscribe_fn<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Trace, &StoreEvent<'_>) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe(f)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock_state().subscribers.entries.len()
    }

    // =========================================================================
    // READ HANDLE
    // =========================================================================

    /// Run `f` with read access to the trace.
    pub fn read<R>(&self, f: impl FnOnce(&Trace) -> R) -> R {
        f(&self.lock_state().trace)
    }

    /// Full recursive snapshot, tagged with the current revision.
    #[must_use]
    pub fn snapshot(&self) -> TraceSnapshot {
        let state = self.lock_state();
        TraceSnapshot::capture(&state.trace, state.revision)
    }

    #[must_use]
    pub fn metrics(&self) -> TraceMetrics {
        self.read(TraceMetrics::from_trace)
    }

    /// The recognition scope registered under `reco_id`, with its subtree.
    #[must_use]
    pub fn recognition(&self, reco_id: i64) -> Option<ScopeSnapshot> {
        let state = self.lock_state();
        let scope = state.index.lookup(reco_id)?;
        ScopeSnapshot::capture(&state.trace, scope)
    }

    /// Recent drops, oldest first.
    #[must_use]
    pub fn drops(&self) -> Vec<DropRecord> {
        self.lock_state().drops.iter().cloned().collect()
    }

    /// Incremented by every dispatch and reset.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.lock_state().revision
    }
}

impl std::fmt::Debug for TraceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceStore")
            .field("revision", &self.revision())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
