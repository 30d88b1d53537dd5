//! # Ingest Loop
//!
//! Single writer in front of the [`TraceStore`].
//!
//! Engine callback threads, HTTP handlers and the reset button all enqueue
//! commands on one unbounded channel; one tokio task drains it and applies
//! them in order. Application order is enqueue order, and a reset is
//! ordered with respect to every notification queued before it.
//!
//! ```text
//! engine thread ──notify──┐
//! POST /notify ──dispatch─┼──► mpsc ──► ingest task ──► TraceStore ──► subscribers
//! POST /reset ───reset────┘                                      └──► watch<revision>
//! ```

use maadbg_core::{
    DebuggerError, Message, Normalizer, Outcome, RawNotification, ScopeKind, StoreEvent,
    SubscriberError, Trace, TraceStore, task_scope_count,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// A unit of work for the ingest task.
#[derive(Debug)]
pub enum IngestCommand {
    /// A raw engine notification; normalized on the ingest task.
    Notify(RawNotification),
    /// An already normalized message, optionally reporting its outcome.
    Dispatch {
        message: Message,
        reply: Option<oneshot::Sender<Outcome>>,
    },
    /// Clear the trace; replies with the revision after the reset.
    Reset(oneshot::Sender<u64>),
}

/// Cloneable sender side of the ingest loop.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: mpsc::UnboundedSender<IngestCommand>,
    revision: watch::Receiver<u64>,
}

impl IngestHandle {
    fn send(&self, command: IngestCommand) -> Result<(), DebuggerError> {
        self.tx
            .send(command)
            .map_err(|_| DebuggerError::ChannelClosed)
    }

    /// Hand off a raw notification. Never blocks; callable from any thread.
    pub fn notify(&self, raw: RawNotification) -> Result<(), DebuggerError> {
        self.send(IngestCommand::Notify(raw))
    }

    /// Queue a message and get a receiver for its outcome.
    pub fn enqueue(&self, message: Message) -> Result<oneshot::Receiver<Outcome>, DebuggerError> {
        let (reply, outcome) = oneshot::channel();
        self.send(IngestCommand::Dispatch {
            message,
            reply: Some(reply),
        })?;
        Ok(outcome)
    }

    /// Queue a message and wait until it has been applied.
    pub async fn dispatch(&self, message: Message) -> Result<Outcome, DebuggerError> {
        self.enqueue(message)?
            .await
            .map_err(|_| DebuggerError::ChannelClosed)
    }

    /// Reset the trace once everything queued before has been applied.
    pub async fn reset(&self) -> Result<u64, DebuggerError> {
        let (reply, done) = oneshot::channel();
        self.send(IngestCommand::Reset(reply))?;
        done.await.map_err(|_| DebuggerError::ChannelClosed)
    }

    /// Latest published store revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Wait until the revision moves past `after`, or until `timeout`.
    ///
    /// Returns the revision observed last.
    pub async fn wait_for_revision(&self, after: u64, timeout: Duration) -> u64 {
        let mut rx = self.revision.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|rev| *rev > after)).await {
            Ok(Ok(rev)) => *rev,
            _ => self.revision(),
        }
    }
}

/// Start the ingest task for `store`.
///
/// The task ends once every [`IngestHandle`] has been dropped. Must be
/// called from within a tokio runtime.
pub fn spawn_ingest_loop(store: Arc<TraceStore>) -> IngestHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<IngestCommand>();
    let (revision_tx, revision_rx) = watch::channel(store.revision());

    // Subscriptions live as long as the store.
    let _ = store.subscribe_fn(move |_, event| {
        revision_tx.send_replace(event.revision());
        Ok(())
    });
    let _ = store.subscribe_fn(log_task_lifecycle);

    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                IngestCommand::Notify(raw) => {
                    if let Some(message) = Normalizer::accept(&raw) {
                        store.dispatch(&message);
                    }
                }
                IngestCommand::Dispatch { message, reply } => {
                    let outcome = store.dispatch(&message);
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
                IngestCommand::Reset(reply) => {
                    store.reset();
                    let _ = reply.send(store.revision());
                }
            }
        }
        tracing::debug!("ingest loop stopped");
    });

    IngestHandle {
        tx,
        revision: revision_rx,
    }
}

/// Store subscriber that logs task starts and finishes.
pub fn log_task_lifecycle(trace: &Trace, event: &StoreEvent<'_>) -> Result<(), SubscriberError> {
    let StoreEvent::Applied {
        message, outcome, ..
    } = event
    else {
        return Ok(());
    };
    if message.kind != ScopeKind::Task {
        return Ok(());
    }

    match outcome {
        Outcome::Opened(task) => {
            tracing::info!(task = %task, entry = message.label(), "task started");
        }
        Outcome::Closed(task) => {
            let status = trace
                .scope(*task)
                .map(|s| s.status())
                .ok_or_else(|| SubscriberError::new(format!("closed task {} missing", task)))?;
            tracing::info!(
                task = %task,
                %status,
                scopes = task_scope_count(trace, *task),
                "task finished"
            );
        }
        Outcome::Dropped(_) => {}
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use maadbg_core::Phase;
    use serde_json::json;

    #[tokio::test]
    async fn commands_apply_in_enqueue_order() {
        let store = Arc::new(TraceStore::new());
        let handle = spawn_ingest_loop(Arc::clone(&store));

        handle
            .notify(RawNotification::new("Tasker.Task.Starting", json!({"entry": "E"})))
            .expect("notify");
        handle
            .notify(RawNotification::new("Node.PipelineNode.Starting", json!({"name": "A"})))
            .expect("notify");
        let outcome = handle
            .dispatch(Message::new(ScopeKind::PipelineNode, Phase::Succeeded))
            .await
            .expect("dispatch");

        assert!(matches!(outcome, Outcome::Closed(_)));
        assert_eq!(store.read(|t| t.depth()), 0);
        assert_eq!(handle.revision(), 3);
    }

    #[tokio::test]
    async fn reset_waits_for_queued_notifications() {
        let store = Arc::new(TraceStore::new());
        let handle = spawn_ingest_loop(Arc::clone(&store));

        for _ in 0..10 {
            handle
                .notify(RawNotification::new("Task.Starting", json!({})))
                .expect("notify");
        }
        let revision = handle.reset().await.expect("reset");

        assert_eq!(revision, 11);
        assert!(store.read(Trace::is_empty));
    }

    #[tokio::test]
    async fn wait_for_revision_times_out_with_current_value() {
        let store = Arc::new(TraceStore::new());
        let handle = spawn_ingest_loop(store);

        let rev = handle
            .wait_for_revision(5, Duration::from_millis(20))
            .await;
        assert_eq!(rev, 0);
    }

    #[test]
    fn lifecycle_logger_ignores_non_task_events() {
        let trace = Trace::new();
        let message = Message::new(ScopeKind::Action, Phase::Starting);
        let event = StoreEvent::Applied {
            message: &message,
            outcome: Outcome::Dropped(maadbg_core::DropReason::NoActiveTask),
            revision: 1,
        };
        assert!(log_task_lifecycle(&trace, &event).is_ok());
        assert!(log_task_lifecycle(&trace, &StoreEvent::Reset { revision: 2 }).is_ok());
    }
}
