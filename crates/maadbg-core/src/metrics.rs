//! # Trace Metrics
//!
//! Counters over a trace, cheap enough to compute on every status request.

use crate::trace::Trace;
use crate::{ScopeId, Status};
use serde::{Deserialize, Serialize};

/// Summary counters of a trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMetrics {
    pub tasks: usize,
    pub scopes: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Current tracker depth.
    pub depth: usize,
    /// Levels in the deepest branch, counting the task itself.
    pub height: usize,
}

impl TraceMetrics {
    #[must_use]
    pub fn from_trace(trace: &Trace) -> Self {
        let mut metrics = Self {
            tasks: trace.tasks().len(),
            scopes: trace.len(),
            depth: trace.depth(),
            ..Self::default()
        };

        // Creation order is topological, so one forward pass fills levels.
        let mut level: Vec<usize> = vec![0; trace.len()];
        for scope in trace.scopes() {
            match scope.status() {
                Status::Running => metrics.running += 1,
                Status::Succeeded => metrics.succeeded += 1,
                Status::Failed => metrics.failed += 1,
            }

            let own = scope
                .parent()
                .and_then(|parent| level.get(parent.index()).copied())
                .map_or(1, |parent_level| parent_level + 1);
            if let Some(slot) = level.get_mut(scope.id().index()) {
                *slot = own;
            }
            metrics.height = metrics.height.max(own);
        }

        metrics
    }

    /// Number of scopes that reached a terminal status.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Number of scopes in the subtree of `task`, the task included.
#[must_use]
pub fn task_scope_count(trace: &Trace, task: ScopeId) -> usize {
    let mut count = 0;
    let mut pending = vec![task];
    while let Some(id) = pending.pop() {
        if let Some(scope) = trace.scope(id) {
            count += 1;
            pending.extend(scope.owned());
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nested::NestedRecognitionIndex;
    use crate::reducer::Reducer;
    use crate::{Message, Phase, ScopeKind};

    #[test]
    fn empty_trace_has_zero_metrics() {
        assert_eq!(TraceMetrics::from_trace(&Trace::new()), TraceMetrics::default());
    }

    #[test]
    fn counts_status_and_height() {
        let mut trace = Trace::new();
        let mut index = NestedRecognitionIndex::new();
        for message in [
            Message::new(ScopeKind::Task, Phase::Starting),
            Message::new(ScopeKind::PipelineNode, Phase::Starting),
            Message::new(ScopeKind::NextList, Phase::Starting),
            Message::new(ScopeKind::Recognition, Phase::Starting),
            Message::new(ScopeKind::Recognition, Phase::Failed),
        ] {
            Reducer::apply(&mut trace, &mut index, &message);
        }

        let metrics = TraceMetrics::from_trace(&trace);
        assert_eq!(metrics.tasks, 1);
        assert_eq!(metrics.scopes, 4);
        assert_eq!(metrics.running, 3);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.finished(), 1);
        assert_eq!(metrics.depth, 2);
        assert_eq!(metrics.height, 4);

        let task = trace.tasks()[0];
        assert_eq!(task_scope_count(&trace, task), 4);
    }
}
