//! # Nested-Recognition Index
//!
//! Side table for recognitions that custom pipeline code triggers directly.
//!
//! Such calls emit `RecognitionNode` notifications outside the usual
//! `NextList → Recognition` shape and may nest arbitrarily. The structural
//! walk in the reducer only sees the open path, so this index keeps:
//! - a nesting counter, raised by every open `RecognitionNode`
//! - a stack of the open nestable scopes (`RecognitionNode` / `Recognition`)
//! - a map from recognition id to the `Recognition` scope created for it
//!
//! The index never alters the tree; it only decides where certain scopes
//! attach and how their terminal notifications are matched.

use crate::ScopeId;
use std::collections::BTreeMap;

/// Stack + id map consulted by the reducer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedRecognitionIndex {
    nesting: usize,
    stack: Vec<ScopeId>,
    by_reco_id: BTreeMap<i64, ScopeId>,
}

impl NestedRecognitionIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recognition nodes currently open.
    #[must_use]
    pub fn nesting(&self) -> usize {
        self.nesting
    }

    /// Whether recognition nodes are currently open.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.nesting > 0
    }

    /// The innermost open nestable scope.
    #[must_use]
    pub fn top(&self) -> Option<ScopeId> {
        self.stack.last().copied()
    }

    /// Open nestable scopes, outermost first.
    #[must_use]
    pub fn stack(&self) -> &[ScopeId] {
        &self.stack
    }

    /// Record a newly opened `RecognitionNode`.
    pub fn enter_node(&mut self, node: ScopeId) {
        self.nesting = self.nesting.saturating_add(1);
        self.stack.push(node);
    }

    /// Record the close of a `RecognitionNode`.
    ///
    /// Pops the stack down to and including `node`; recognitions left open
    /// above it are abandoned by the stack (their terminals still resolve by
    /// id). If `node` is not on the stack the stack is left untouched.
    pub fn leave_node(&mut self, node: ScopeId) {
        self.nesting = self.nesting.saturating_sub(1);
        if let Some(pos) = self.stack.iter().rposition(|id| *id == node) {
            self.stack.truncate(pos);
        }
    }

    /// Drop nesting state at a task boundary, keeping the id map.
    ///
    /// Recognitions of earlier tasks stay resolvable by id.
    pub fn reset_nesting(&mut self) {
        self.nesting = 0;
        self.stack.clear();
    }

    /// Push a recognition opened while nested.
    pub fn push_recognition(&mut self, scope: ScopeId) {
        self.stack.push(scope);
    }

    /// Remove a recognition from the stack once it closes.
    ///
    /// Returns whether it was present.
    pub fn remove(&mut self, scope: ScopeId) -> bool {
        match self.stack.iter().rposition(|id| *id == scope) {
            Some(pos) => {
                self.stack.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Register a recognition scope under its engine id.
    ///
    /// Ids are unique per engine run; if one repeats, the latest scope wins.
    pub fn register(&mut self, reco_id: i64, scope: ScopeId) {
        if let Some(previous) = self.by_reco_id.insert(reco_id, scope) {
            tracing::debug!(reco_id, %previous, %scope, "recognition id reused");
        }
    }

    /// Find the scope created for a recognition id.
    #[must_use]
    pub fn lookup(&self, reco_id: i64) -> Option<ScopeId> {
        self.by_reco_id.get(&reco_id).copied()
    }

    /// Number of registered recognitions.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.by_reco_id.len()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.nesting = 0;
        self.stack.clear();
        self.by_reco_id.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_and_leave_track_nesting() {
        let mut index = NestedRecognitionIndex::new();
        index.enter_node(ScopeId(3));
        index.push_recognition(ScopeId(4));
        index.enter_node(ScopeId(5));

        assert_eq!(index.nesting(), 2);
        assert_eq!(index.top(), Some(ScopeId(5)));

        index.leave_node(ScopeId(5));
        assert_eq!(index.nesting(), 1);
        assert_eq!(index.top(), Some(ScopeId(4)));

        index.leave_node(ScopeId(3));
        assert!(!index.is_nested());
        assert!(index.stack().is_empty());
    }

    #[test]
    fn leave_never_underflows() {
        let mut index = NestedRecognitionIndex::new();
        index.leave_node(ScopeId(1));
        assert_eq!(index.nesting(), 0);
    }

    #[test]
    fn remove_reports_presence() {
        let mut index = NestedRecognitionIndex::new();
        index.push_recognition(ScopeId(2));
        assert!(index.remove(ScopeId(2)));
        assert!(!index.remove(ScopeId(2)));
    }

    #[test]
    fn latest_registration_wins() {
        let mut index = NestedRecognitionIndex::new();
        index.register(9, ScopeId(1));
        index.register(9, ScopeId(2));
        assert_eq!(index.lookup(9), Some(ScopeId(2)));
        assert_eq!(index.registered(), 1);
    }

    #[test]
    fn clear_resets_everything() {
        let mut index = NestedRecognitionIndex::new();
        index.enter_node(ScopeId(0));
        index.register(1, ScopeId(1));
        index.clear();
        assert_eq!(index, NestedRecognitionIndex::new());
    }
}
