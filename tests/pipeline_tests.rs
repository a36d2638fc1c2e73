//! Integration tests for the pipeline: slot reservation, ordered
//! fan-out/fan-in across chained groups, backpressure, and lifecycle
//! contract checks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use seqpipe::{
    EventKind, HandlerError, HandlerFn, HandlerRef, RuntimeError, SequenceId, TaskManager,
};

/// Handler that appends every `(id, index)` pair it sees to a shared log.
fn recording(log: Arc<Mutex<Vec<(SequenceId, usize)>>>) -> HandlerRef {
    HandlerFn::arc("recording", move |id: SequenceId, index: usize| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push((id, index));
            Ok::<_, HandlerError>(())
        }
    })
}

/// Handler that bumps a shared invocation counter.
fn counting(hits: Arc<AtomicUsize>) -> HandlerRef {
    HandlerFn::arc("counting", move |_id: SequenceId, _index: usize| {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok::<_, HandlerError>(())
        }
    })
}

/// One group, one handler, three submissions: identifiers and slot
/// indices come out as 0, 1, 2.
#[tokio::test(flavor = "multi_thread")]
async fn single_group_three_submissions() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut tm = TaskManager::new(1024).unwrap();
    tm.add_handler(recording(log.clone())).unwrap();
    tm.start().await.unwrap();

    assert_eq!(tm.submit().await.unwrap(), 0);
    assert_eq!(tm.submit().await.unwrap(), 1);
    assert_eq!(tm.submit().await.unwrap(), 2);

    tm.stop().await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec![(0, 0), (1, 1), (2, 2)]);
}

/// Five parallel handlers, two submissions: ten invocations in total and
/// the group's last processed identifier is 1.
#[tokio::test(flavor = "multi_thread")]
async fn five_parallel_handlers_two_submissions() {
    let hits = Arc::new(AtomicUsize::new(0));

    let mut tm = TaskManager::new(64).unwrap();
    let group = tm
        .add_handlers((0..5).map(|_| counting(hits.clone())))
        .unwrap();
    tm.start().await.unwrap();

    tm.submit().await.unwrap();
    tm.submit().await.unwrap();
    tm.stop().await.unwrap();

    assert_eq!(group.handler_count(), 5);
    assert_eq!(hits.load(Ordering::SeqCst), 10);
    assert_eq!(group.last_processed_id(), 1);
}

/// A terminal group can be drained on its own: the stage-local sentinel
/// travels behind the queued identifiers and stops the workers without
/// touching the manager's lifecycle.
#[tokio::test(flavor = "multi_thread")]
async fn stage_local_stop_drains_terminal_group() {
    let hits = Arc::new(AtomicUsize::new(0));

    let mut tm = TaskManager::new(64).unwrap();
    let group = tm.add_handler(counting(hits.clone())).unwrap();
    tm.start().await.unwrap();

    for _ in 0..3 {
        tm.submit().await.unwrap();
    }
    group.stop().await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(group.last_processed_id(), 2);

    // The manager's cascading stop stays clean after the stage drained.
    tm.stop().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

/// A group with successors refuses a stage-local stop; the pipeline keeps
/// running and still shuts down cleanly through the manager.
#[tokio::test(flavor = "multi_thread")]
async fn stage_local_stop_rejects_non_terminal_group() {
    let hits = Arc::new(AtomicUsize::new(0));

    let mut tm = TaskManager::new(64).unwrap();
    let first = tm.add_handler(counting(hits.clone())).unwrap();
    let second = first.then(counting(hits.clone())).unwrap();
    tm.start().await.unwrap();

    assert!(matches!(first.stop().await, Err(RuntimeError::NotTerminal)));

    tm.submit().await.unwrap();
    tm.stop().await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(second.last_processed_id(), 0);
}

/// Chain of depth three over a shared slot array: the init callback
/// resets the slot before any stage touches it, each stage increments it
/// once, so after the run every slot holds exactly 3.
#[tokio::test(flavor = "multi_thread")]
async fn chained_stages_visit_every_slot_three_times() {
    const SIZE: usize = 1024;
    const SUBMISSIONS: usize = 8 * SIZE;

    let values: Arc<Vec<AtomicUsize>> = Arc::new((0..SIZE).map(|_| AtomicUsize::new(0)).collect());

    let stage = |name: &'static str| {
        let values = values.clone();
        HandlerFn::arc(name, move |_id: SequenceId, index: usize| {
            let values = values.clone();
            async move {
                values[index].fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(())
            }
        })
    };

    let mut tm = TaskManager::new(SIZE).unwrap();
    tm.add_handler(stage("first"))
        .unwrap()
        .then(stage("second"))
        .unwrap()
        .then(stage("third"))
        .unwrap();
    tm.start().await.unwrap();

    for _ in 0..SUBMISSIONS {
        let values = values.clone();
        tm.submit_with(move |_id, index| {
            values[index].store(0, Ordering::SeqCst);
        })
        .await
        .unwrap();
    }
    tm.stop().await.unwrap();

    for (i, v) in values.iter().enumerate() {
        assert_eq!(v.load(Ordering::SeqCst), 3, "slot {i}");
    }
}

/// Every handler of a group receives every identifier in submission
/// order on its own channel.
#[tokio::test(flavor = "multi_thread")]
async fn handlers_receive_identifiers_in_order() {
    let log_a = Arc::new(Mutex::new(Vec::new()));
    let log_b = Arc::new(Mutex::new(Vec::new()));

    let mut tm = TaskManager::new(256).unwrap();
    tm.add_handlers([recording(log_a.clone()), recording(log_b.clone())])
        .unwrap();
    tm.start().await.unwrap();

    for _ in 0..100 {
        tm.submit().await.unwrap();
    }
    tm.stop().await.unwrap();

    let expected: Vec<SequenceId> = (0..100).collect();
    let seen_a: Vec<SequenceId> = log_a.lock().unwrap().iter().map(|(id, _)| *id).collect();
    let seen_b: Vec<SequenceId> = log_b.lock().unwrap().iter().map(|(id, _)| *id).collect();
    assert_eq!(seen_a, expected);
    assert_eq!(seen_b, expected);
}

/// A tiny ring with a slow handler: submissions complete, every slot is
/// reused, and no slot is ever entered concurrently.
#[tokio::test(flavor = "multi_thread")]
async fn backpressure_reuses_slots_safely() {
    const SIZE: usize = 4;
    const SUBMISSIONS: usize = 10;

    let in_slot: Arc<Vec<AtomicBool>> = Arc::new((0..SIZE).map(|_| AtomicBool::new(false)).collect());
    let passes: Arc<Vec<AtomicUsize>> = Arc::new((0..SIZE).map(|_| AtomicUsize::new(0)).collect());
    let overlap = Arc::new(AtomicBool::new(false));

    let slow = {
        let in_slot = in_slot.clone();
        let passes = passes.clone();
        let overlap = overlap.clone();
        HandlerFn::arc("slow", move |_id: SequenceId, index: usize| {
            let in_slot = in_slot.clone();
            let passes = passes.clone();
            let overlap = overlap.clone();
            async move {
                if in_slot[index].swap(true, Ordering::SeqCst) {
                    overlap.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                passes[index].fetch_add(1, Ordering::SeqCst);
                in_slot[index].store(false, Ordering::SeqCst);
                Ok::<_, HandlerError>(())
            }
        })
    };

    let mut tm = TaskManager::new(SIZE).unwrap();
    tm.add_handler(slow).unwrap();
    tm.start().await.unwrap();

    for _ in 0..SUBMISSIONS {
        tm.submit().await.unwrap();
    }
    tm.stop().await.unwrap();

    assert!(!overlap.load(Ordering::SeqCst), "slot entered concurrently");
    let total: usize = passes.iter().map(|p| p.load(Ordering::SeqCst)).sum();
    assert_eq!(total, SUBMISSIONS);
    for (i, p) in passes.iter().enumerate() {
        assert!(p.load(Ordering::SeqCst) >= 2, "slot {i} never reused");
    }
}

/// Two root groups each independently see every identifier.
#[tokio::test(flavor = "multi_thread")]
async fn multiple_roots_see_every_identifier() {
    let hits_a = Arc::new(AtomicUsize::new(0));
    let hits_b = Arc::new(AtomicUsize::new(0));

    let mut tm = TaskManager::new(64).unwrap();
    let root_a = tm.add_handler(counting(hits_a.clone())).unwrap();
    let root_b = tm.add_handler(counting(hits_b.clone())).unwrap();
    tm.start().await.unwrap();

    for _ in 0..5 {
        tm.submit().await.unwrap();
    }
    tm.stop().await.unwrap();

    assert_eq!(hits_a.load(Ordering::SeqCst), 5);
    assert_eq!(hits_b.load(Ordering::SeqCst), 5);
    assert_eq!(root_a.last_processed_id(), 4);
    assert_eq!(root_b.last_processed_id(), 4);
}

/// After a clean stop, chained groups agree on the last processed
/// identifier: nothing is lost between stages.
#[tokio::test(flavor = "multi_thread")]
async fn chained_groups_drain_to_the_same_point() {
    let hits = Arc::new(AtomicUsize::new(0));

    let mut tm = TaskManager::new(128).unwrap();
    let first = tm.add_handler(counting(hits.clone())).unwrap();
    let second = first.then(counting(hits.clone())).unwrap();
    tm.start().await.unwrap();

    for _ in 0..50 {
        tm.submit().await.unwrap();
    }
    tm.stop().await.unwrap();

    assert_eq!(first.last_processed_id(), 49);
    assert_eq!(second.last_processed_id(), 49);
    assert_eq!(hits.load(Ordering::SeqCst), 100);
}

/// Handler failures are absorbed: they surface as events while the
/// identifier still flows through the stage.
#[tokio::test(flavor = "multi_thread")]
async fn handler_failures_are_absorbed() {
    let mut tm = TaskManager::new(64).unwrap();
    let group = tm
        .add_handler(HandlerFn::arc(
            "flaky",
            |id: SequenceId, _index: usize| async move {
                if id % 2 == 1 {
                    Err(HandlerError::Fail {
                        reason: format!("odd id {id}"),
                    })
                } else {
                    Ok(())
                }
            },
        ))
        .unwrap();
    let mut events = tm.events();
    tm.start().await.unwrap();

    for _ in 0..10 {
        tm.submit().await.unwrap();
    }
    tm.stop().await.unwrap();

    assert_eq!(group.last_processed_id(), 9);

    let mut failures = 0;
    while let Ok(ev) = events.recv().await {
        if ev.kind == EventKind::HandlerFailed {
            failures += 1;
        }
        if ev.kind == EventKind::PipelineStopped {
            break;
        }
    }
    assert_eq!(failures, 5);
}

/// Contract violations are rejected where detection is cheap.
#[tokio::test(flavor = "multi_thread")]
async fn lifecycle_contract_violations() {
    assert!(matches!(
        TaskManager::new(3),
        Err(RuntimeError::SizeNotPowerOfTwo { size: 3 })
    ));
    assert!(matches!(
        TaskManager::new(0),
        Err(RuntimeError::SizeNotPowerOfTwo { size: 0 })
    ));

    let hits = Arc::new(AtomicUsize::new(0));
    let mut tm = TaskManager::new(16).unwrap();

    // Not running yet.
    assert!(matches!(tm.submit().await, Err(RuntimeError::NotRunning)));
    assert!(matches!(tm.stop().await, Err(RuntimeError::NotRunning)));

    let group = tm.add_handler(counting(hits.clone())).unwrap();
    tm.start().await.unwrap();

    // Frozen topology.
    assert!(matches!(
        tm.add_handler(counting(hits.clone())),
        Err(RuntimeError::NotConfigurable)
    ));
    assert!(matches!(
        group.then(counting(hits.clone())),
        Err(RuntimeError::NotConfigurable)
    ));
    assert!(matches!(
        group.add_handler(counting(hits.clone())),
        Err(RuntimeError::NotConfigurable)
    ));
    assert!(matches!(tm.start().await, Err(RuntimeError::AlreadyStarted)));

    tm.stop().await.unwrap();
    assert!(matches!(tm.submit().await, Err(RuntimeError::NotRunning)));

    // Empty handler lists are rejected outright.
    let mut tm = TaskManager::new(16).unwrap();
    assert!(matches!(
        tm.add_handlers(Vec::new()),
        Err(RuntimeError::NoHandlers)
    ));
}

/// Subscribers registered before start observe the full lifecycle, ending
/// with `PipelineStopped`.
#[tokio::test(flavor = "multi_thread")]
async fn subscriber_observes_lifecycle() {
    use async_trait::async_trait;
    use seqpipe::{Event, Subscriber};

    #[derive(Default)]
    struct Counting {
        groups_started: AtomicUsize,
        stopped: AtomicUsize,
    }

    #[async_trait]
    impl Subscriber for Counting {
        async fn handle(&self, event: &Event) {
            match event.kind {
                EventKind::GroupStarted => {
                    self.groups_started.fetch_add(1, Ordering::SeqCst);
                }
                EventKind::PipelineStopped => {
                    self.stopped.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    let subscriber = Arc::new(Counting::default());
    let hits = Arc::new(AtomicUsize::new(0));

    let mut tm = TaskManager::new(32).unwrap();
    tm.add_handler(counting(hits.clone()))
        .unwrap()
        .then(counting(hits.clone()))
        .unwrap();
    tm.add_subscriber(subscriber.clone()).unwrap();
    tm.start().await.unwrap();

    tm.submit().await.unwrap();
    tm.stop().await.unwrap();

    // `stop` joins the listener after it handled `PipelineStopped`, so
    // the counts are settled here.
    assert_eq!(subscriber.groups_started.load(Ordering::SeqCst), 2);
    assert_eq!(subscriber.stopped.load(Ordering::SeqCst), 1);
}
