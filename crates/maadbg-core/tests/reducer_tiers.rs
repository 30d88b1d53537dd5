//! # Reducer Tier Tests (T0-T4)
//!
//! If ANY tier fails, the reconstructed trace cannot be trusted.
//!
//! ## Tiers
//! - T0: Notification Normalization
//! - T1: Depth Accounting
//! - T2: End-to-End Reconstruction
//! - T3: Nested Recognition
//! - T4: Store Serialization

use maadbg_core::{
    DropReason, Message, NestedRecognitionIndex, Normalizer, Outcome, Phase, RawNotification,
    Reducer, Scope, ScopeId, ScopeKind, Status, Trace, TraceSnapshot, TraceStore,
    export_canonical, import_canonical,
};
use serde_json::json;

fn start(kind: ScopeKind) -> Message {
    Message::new(kind, Phase::Starting)
}

fn succeed(kind: ScopeKind) -> Message {
    Message::new(kind, Phase::Succeeded)
}

fn fail(kind: ScopeKind) -> Message {
    Message::new(kind, Phase::Failed)
}

fn scope(trace: &Trace, id: ScopeId) -> &Scope {
    trace.scope(id).expect("scope exists")
}

// =============================================================================
// TIER T0: NOTIFICATION NORMALIZATION
// =============================================================================

mod t0_normalization {
    use super::*;

    /// T0.1: Engine notifications normalize to the expected kinds.
    #[test]
    fn engine_names_normalize() {
        let raw = RawNotification::new(
            "Node.PipelineNode.Starting",
            json!({"task_id": 1, "node_id": 3, "name": "A"}),
        );
        let msg = Normalizer::normalize(&raw).expect("normalize");
        assert_eq!(msg.kind, ScopeKind::PipelineNode);
        assert_eq!(msg.phase, Phase::Starting);
        assert_eq!(msg.id, Some(3));
    }

    /// T0.2: Unknown names are dropped, never raised.
    #[test]
    fn unknown_names_drop() {
        let raw = RawNotification::new("Tasker.Task.Paused", json!({}));
        assert_eq!(
            Normalizer::normalize(&raw),
            Err(DropReason::UnknownMessageKind)
        );
        assert!(Normalizer::accept(&raw).is_none());
    }

    /// T0.3: Normalized messages are owned and cross threads.
    #[test]
    fn messages_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<Message>();
    }
}

// =============================================================================
// TIER T1: DEPTH ACCOUNTING
// =============================================================================

mod t1_depth {
    use super::*;

    /// T1.1: Task.Starting adds exactly one root scope and zeroes depth.
    #[test]
    fn task_start_adds_one_root() {
        let mut trace = Trace::new();
        let mut index = NestedRecognitionIndex::new();

        Reducer::apply(&mut trace, &mut index, &start(ScopeKind::Task));
        Reducer::apply(&mut trace, &mut index, &start(ScopeKind::PipelineNode));
        let before = trace.tasks().len();

        Reducer::apply(&mut trace, &mut index, &start(ScopeKind::Task));
        assert_eq!(trace.tasks().len(), before + 1);
        assert_eq!(trace.depth(), 0);
    }

    /// T1.2: Legal starts add one level, legal terminals remove one.
    #[test]
    fn legal_transitions_move_depth_by_one() {
        let mut trace = Trace::new();
        let mut index = NestedRecognitionIndex::new();
        Reducer::apply(&mut trace, &mut index, &start(ScopeKind::Task));

        let opens = [
            ScopeKind::PipelineNode,
            ScopeKind::NextList,
            ScopeKind::Recognition,
            ScopeKind::PipelineNode,
            ScopeKind::Action,
            ScopeKind::ActionNode,
            ScopeKind::Action,
        ];
        for (level, kind) in opens.iter().enumerate() {
            let outcome = Reducer::apply(&mut trace, &mut index, &start(*kind));
            assert!(matches!(outcome, Outcome::Opened(_)), "{kind} at {level}");
            assert_eq!(trace.depth(), level + 1);
        }

        for (closed, kind) in opens.iter().rev().enumerate() {
            let outcome = Reducer::apply(&mut trace, &mut index, &succeed(*kind));
            assert!(matches!(outcome, Outcome::Closed(_)), "{kind}");
            assert_eq!(trace.depth(), opens.len() - closed - 1);
        }
    }

    /// T1.3: A stray terminal at depth zero never underflows.
    #[test]
    fn stray_terminal_keeps_depth_at_zero() {
        let mut trace = Trace::new();
        let mut index = NestedRecognitionIndex::new();
        Reducer::apply(&mut trace, &mut index, &start(ScopeKind::Task));

        let outcome = Reducer::apply(&mut trace, &mut index, &succeed(ScopeKind::PipelineNode));
        assert_eq!(outcome, Outcome::Dropped(DropReason::TraceExhausted));
        assert_eq!(trace.depth(), 0);
    }

    /// T1.4: Dropped messages leave the trace unchanged.
    #[test]
    fn drops_are_no_ops() {
        let mut trace = Trace::new();
        let mut index = NestedRecognitionIndex::new();
        for msg in [
            start(ScopeKind::Task),
            start(ScopeKind::PipelineNode),
            start(ScopeKind::NextList),
        ] {
            Reducer::apply(&mut trace, &mut index, &msg);
        }

        for msg in [
            start(ScopeKind::Action),
            succeed(ScopeKind::Action),
            fail(ScopeKind::PipelineNode),
            start(ScopeKind::NextList),
            succeed(ScopeKind::RecognitionNode),
        ] {
            let trace_before = trace.clone();
            let index_before = index.clone();
            let outcome = Reducer::apply(&mut trace, &mut index, &msg);
            assert!(outcome.is_dropped(), "{msg}");
            assert_eq!(trace, trace_before);
            assert_eq!(index, index_before);
        }
    }

    /// T1.5: Without a task, nothing is recorded.
    #[test]
    fn pipeline_terminal_without_task_leaves_trace_empty() {
        let mut trace = Trace::new();
        let mut index = NestedRecognitionIndex::new();
        let outcome = Reducer::apply(&mut trace, &mut index, &succeed(ScopeKind::PipelineNode));

        assert_eq!(outcome, Outcome::Dropped(DropReason::NoActiveTask));
        assert!(trace.is_empty());
        assert!(trace.tasks().is_empty());
    }

    /// T1.6: After the task finishes, children are no longer accepted.
    #[test]
    fn finished_task_is_not_active() {
        let mut trace = Trace::new();
        let mut index = NestedRecognitionIndex::new();
        Reducer::apply(&mut trace, &mut index, &start(ScopeKind::Task));
        Reducer::apply(&mut trace, &mut index, &succeed(ScopeKind::Task));

        let outcome = Reducer::apply(&mut trace, &mut index, &start(ScopeKind::PipelineNode));
        assert_eq!(outcome, Outcome::Dropped(DropReason::NoActiveTask));
    }

    /// T1.7: Recursive pipelines stop nesting at the depth limit.
    #[test]
    fn recursive_pipeline_stops_at_depth_limit() {
        use maadbg_core::primitives::MAX_TRACE_DEPTH;
        use std::sync::Arc;

        let store = Arc::new(TraceStore::new());
        store.dispatch(&start(ScopeKind::Task));
        store.dispatch(&start(ScopeKind::PipelineNode).with_name("Loop"));
        for reco_id in 0..2 * MAX_TRACE_DEPTH as i64 {
            store.dispatch(&start(ScopeKind::NextList).with_next_list(["Loop"]));
            store.dispatch(&start(ScopeKind::Recognition).with_name("Loop").with_id(reco_id));
            store.dispatch(&start(ScopeKind::PipelineNode).with_name("Loop"));
        }

        assert_eq!(store.read(Trace::depth), MAX_TRACE_DEPTH);
        assert_eq!(store.read(Trace::len), MAX_TRACE_DEPTH + 1);
        let drops = store.drops();
        assert!(!drops.is_empty());
        assert!(drops.iter().all(|d| d.reason == DropReason::DepthLimitExceeded));

        // Closing still works at the limit.
        let outcome = store.dispatch(&succeed(ScopeKind::Recognition).with_id(1));
        assert!(matches!(outcome, Outcome::Closed(_)));

        let reader = Arc::clone(&store);
        let encoded_len = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                let snapshot = reader.snapshot();
                let json = serde_json::to_vec(&snapshot).expect("serialize");
                let back: TraceSnapshot = serde_json::from_slice(&json).expect("deserialize");
                assert_eq!(back.scope_count(), MAX_TRACE_DEPTH + 1);

                let bytes = reader.read(export_canonical).expect("export");
                let trace = import_canonical(&bytes).expect("import");
                assert_eq!(trace.depth(), MAX_TRACE_DEPTH - 1);
                json.len()
            })
            .expect("spawn")
            .join()
            .expect("snapshot on a small stack");
        assert!(encoded_len > 0);
    }
}

// =============================================================================
// TIER T2: END-TO-END RECONSTRUCTION
// =============================================================================

mod t2_end_to_end {
    use super::*;

    /// T2.1: One pipeline node, one next list, two recognitions.
    #[test]
    fn next_list_with_two_recognitions() {
        let store = TraceStore::new();
        let stream = [
            start(ScopeKind::Task).with_entry("Start"),
            start(ScopeKind::PipelineNode).with_name("A"),
            start(ScopeKind::NextList)
                .with_name("A")
                .with_next_list(["B", "C"]),
            start(ScopeKind::Recognition).with_name("B").with_id(1),
            succeed(ScopeKind::Recognition).with_name("B").with_id(1),
            start(ScopeKind::Recognition).with_name("C").with_id(2),
            fail(ScopeKind::Recognition).with_name("C").with_id(2),
            succeed(ScopeKind::NextList).with_name("A"),
            succeed(ScopeKind::PipelineNode).with_name("A"),
            succeed(ScopeKind::Task),
        ];
        for msg in &stream {
            let outcome = store.dispatch(msg);
            assert!(!outcome.is_dropped(), "{msg}");
        }

        store.read(|trace| {
            assert_eq!(trace.tasks().len(), 1);
            assert_eq!(trace.depth(), 0);

            let task = scope(trace, trace.tasks()[0]);
            assert_eq!(task.status(), Status::Succeeded);
            assert_eq!(task.children().len(), 1);

            let node = scope(trace, task.children()[0]);
            assert_eq!(node.kind(), ScopeKind::PipelineNode);
            assert_eq!(node.status(), Status::Succeeded);
            assert_eq!(node.reco().len(), 1);

            let list = scope(trace, node.reco()[0]);
            assert_eq!(list.kind(), ScopeKind::NextList);
            assert_eq!(list.status(), Status::Succeeded);
            assert_eq!(list.payload().next_list, vec!["B", "C"]);

            let recos: Vec<_> = list
                .children()
                .iter()
                .map(|id| {
                    let s = scope(trace, *id);
                    (s.name().map(str::to_string), s.payload().id, s.status())
                })
                .collect();
            assert_eq!(
                recos,
                vec![
                    (Some("B".to_string()), Some(1), Status::Succeeded),
                    (Some("C".to_string()), Some(2), Status::Failed),
                ]
            );
        });

        assert!(store.drops().is_empty());
    }

    /// T2.2: Hit recognition leads into the action and a child pipeline node.
    #[test]
    fn action_hosts_nested_pipeline() {
        let mut trace = Trace::new();
        let mut index = NestedRecognitionIndex::new();
        let stream = [
            start(ScopeKind::Task),
            start(ScopeKind::PipelineNode).with_name("A"),
            start(ScopeKind::Action).with_name("A"),
            start(ScopeKind::PipelineNode).with_name("Sub"),
            succeed(ScopeKind::PipelineNode).with_name("Sub"),
            succeed(ScopeKind::Action).with_name("A"),
            succeed(ScopeKind::PipelineNode).with_name("A"),
        ];
        for msg in &stream {
            assert!(!Reducer::apply(&mut trace, &mut index, msg).is_dropped(), "{msg}");
        }

        let top = scope(&trace, scope(&trace, trace.tasks()[0]).children()[0]);
        let action = scope(&trace, top.action().expect("action slot"));
        assert_eq!(action.children().len(), 1);
        assert_eq!(
            scope(&trace, action.children()[0]).name(),
            Some("Sub")
        );
    }

    /// T2.3: Two tasks in one session keep their history.
    #[test]
    fn tasks_accumulate_until_reset() {
        let store = TraceStore::new();
        for _ in 0..2 {
            store.dispatch(&start(ScopeKind::Task));
            store.dispatch(&start(ScopeKind::PipelineNode));
            store.dispatch(&succeed(ScopeKind::PipelineNode));
            store.dispatch(&succeed(ScopeKind::Task));
        }
        assert_eq!(store.read(|t| t.tasks().len()), 2);
        assert_eq!(store.metrics().succeeded, 4);
    }
}

// =============================================================================
// TIER T3: NESTED RECOGNITION
// =============================================================================

mod t3_nested {
    use super::*;

    fn into_action(store: &TraceStore) {
        for msg in [
            start(ScopeKind::Task),
            start(ScopeKind::PipelineNode).with_name("A"),
            start(ScopeKind::Action).with_name("A"),
        ] {
            store.dispatch(&msg);
        }
    }

    /// T3.1: A directly invoked recognition fills the detail slot.
    #[test]
    fn recognition_node_detail_slot() {
        let store = TraceStore::new();
        into_action(&store);
        let stream = [
            start(ScopeKind::RecognitionNode).with_name("Custom"),
            start(ScopeKind::Recognition).with_name("Custom").with_id(9),
            succeed(ScopeKind::Recognition).with_name("Custom").with_id(9),
            succeed(ScopeKind::RecognitionNode).with_name("Custom"),
        ];
        let outcomes: Vec<Outcome> = stream.iter().map(|m| store.dispatch(m)).collect();
        assert!(outcomes.iter().all(|o| !o.is_dropped()));

        store.read(|trace| {
            let node_id = outcomes[0].scope().expect("node");
            let reco_id = outcomes[1].scope().expect("reco");
            let node = scope(trace, node_id);

            assert_eq!(node.reco_detail(), Some(reco_id));
            assert_eq!(node.status(), Status::Succeeded);
            assert_eq!(scope(trace, reco_id).status(), Status::Succeeded);
            assert_eq!(scope(trace, reco_id).parent(), Some(node_id));
            // Not under any next list.
            assert!(trace
                .scopes()
                .filter(|s| s.kind() == ScopeKind::NextList)
                .all(|s| !s.children().contains(&reco_id)));
            assert_eq!(trace.depth(), 2);
        });

        let reco = store.recognition(9).expect("resolvable by id");
        assert_eq!(reco.name.as_deref(), Some("Custom"));
    }

    /// T3.2: Recognitions nest inside a custom recognizer.
    #[test]
    fn recognition_inside_custom_recognizer() {
        let store = TraceStore::new();
        into_action(&store);
        let stream = [
            start(ScopeKind::RecognitionNode).with_name("Outer"),
            start(ScopeKind::Recognition).with_name("Outer").with_id(1),
            start(ScopeKind::Recognition).with_name("Inner").with_id(2),
            fail(ScopeKind::Recognition).with_name("Inner").with_id(2),
            succeed(ScopeKind::Recognition).with_name("Outer").with_id(1),
            succeed(ScopeKind::RecognitionNode).with_name("Outer"),
            succeed(ScopeKind::Action).with_name("A"),
            succeed(ScopeKind::PipelineNode).with_name("A"),
        ];
        for msg in &stream {
            assert!(!store.dispatch(msg).is_dropped(), "{msg}");
        }

        let outer = store.recognition(1).expect("outer");
        assert_eq!(outer.status, Status::Succeeded);
        assert_eq!(outer.children.len(), 1);
        assert_eq!(outer.children[0].name.as_deref(), Some("Inner"));
        assert_eq!(outer.children[0].status, Status::Failed);
        assert_eq!(store.read(Trace::depth), 0);
    }

    /// T3.3: A recognition node nested in a nested recognition.
    #[test]
    fn recognition_node_inside_recognition() {
        let store = TraceStore::new();
        into_action(&store);
        let stream = [
            start(ScopeKind::RecognitionNode).with_name("L1"),
            start(ScopeKind::Recognition).with_name("L1").with_id(10),
            start(ScopeKind::RecognitionNode).with_name("L2"),
            start(ScopeKind::Recognition).with_name("L2").with_id(11),
            succeed(ScopeKind::Recognition).with_name("L2").with_id(11),
            succeed(ScopeKind::RecognitionNode).with_name("L2"),
            succeed(ScopeKind::Recognition).with_name("L1").with_id(10),
            succeed(ScopeKind::RecognitionNode).with_name("L1"),
        ];
        for msg in &stream {
            assert!(!store.dispatch(msg).is_dropped(), "{msg}");
        }

        let l1 = store.recognition(10).expect("l1");
        assert_eq!(l1.children.len(), 1);
        assert_eq!(l1.children[0].kind, ScopeKind::RecognitionNode);
        let l2 = l1.children[0].reco_detail.as_deref().expect("detail");
        assert_eq!(l2.engine_id, Some(11));
        assert_eq!(store.read(Trace::depth), 2);
    }
}

// =============================================================================
// TIER T4: STORE SERIALIZATION
// =============================================================================

mod t4_store {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// T4.1: Reset always yields an empty trace.
    #[test]
    fn reset_empties_any_state() {
        let store = TraceStore::new();
        for msg in [
            start(ScopeKind::Task),
            start(ScopeKind::PipelineNode),
            start(ScopeKind::Action),
            start(ScopeKind::RecognitionNode),
        ] {
            store.dispatch(&msg);
        }

        store.reset();
        store.read(|trace| {
            assert!(trace.tasks().is_empty());
            assert!(trace.is_empty());
            assert_eq!(trace.depth(), 0);
        });
    }

    /// T4.2: Reset racing with dispatchers never yields a partial trace.
    #[test]
    fn reset_is_safe_under_concurrent_dispatch() {
        let store = Arc::new(TraceStore::new());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..200 {
                        store.dispatch(&start(ScopeKind::Task));
                        store.dispatch(&start(ScopeKind::PipelineNode));
                        store.dispatch(&succeed(ScopeKind::PipelineNode));
                    }
                })
            })
            .collect();
        let resetter = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..50 {
                    store.reset();
                    store.read(|trace| {
                        assert!(trace.validate().is_ok());
                    });
                }
            })
        };

        for handle in writers {
            handle.join().expect("writer");
        }
        resetter.join().expect("resetter");

        store.read(|trace| assert!(trace.validate().is_ok()));
        store.reset();
        assert!(store.read(Trace::is_empty));
        assert_eq!(store.revision(), 4 * 200 * 3 + 50 + 1);
    }

    /// T4.3: Subscribers observe revisions in order.
    #[test]
    fn subscribers_observe_ordered_revisions() {
        use std::sync::Mutex;

        let store = TraceStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = store.subscribe_fn(move |_, event| {
            sink.lock().expect("lock").push(event.revision());
            Ok(())
        });

        store.dispatch(&start(ScopeKind::Task));
        store.reset();
        store.dispatch(&succeed(ScopeKind::Task));

        assert_eq!(*seen.lock().expect("lock"), vec![1, 2, 3]);
    }
}
