//! Integration tests for the bounded executor: capacity bounds, result
//! handoff, future idempotence, and teardown behavior.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use seqpipe::{BoundedExecutor, JobError, RuntimeError};

/// Two jobs on a two-slot executor: both results arrive, and reading a
/// future twice returns the same pair without blocking or re-running.
#[tokio::test(flavor = "multi_thread")]
async fn results_are_correct_and_idempotent() {
    let ex: BoundedExecutor<i64> = BoundedExecutor::new(2);
    let runs = Arc::new(AtomicI64::new(0));

    let r1 = runs.clone();
    let mut f1 = ex
        .execute(move || async move {
            r1.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        .await
        .unwrap();
    let mut f2 = ex.execute(|| async { Ok(2) }).await.unwrap();

    assert_eq!(f1.result().await, Ok(1));
    assert_eq!(f2.result().await, Ok(2));

    // Idempotent read: same value, job not re-executed.
    assert_eq!(f1.result().await, Ok(1));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    ex.stop().await;
}

/// The number of simultaneously running jobs never exceeds `max`.
#[tokio::test(flavor = "multi_thread")]
async fn capacity_is_bounded() {
    let ex = Arc::new(BoundedExecutor::<i64>::new(2));
    assert_eq!(ex.max(), 2);

    let running = Arc::new(AtomicI64::new(0));
    let peak = Arc::new(AtomicI64::new(0));

    let mut joins = Vec::new();
    for i in 0..8 {
        let ex = ex.clone();
        let running = running.clone();
        let peak = peak.clone();
        joins.push(tokio::spawn(async move {
            let mut fut = ex
                .execute(move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                })
                .await
                .unwrap();
            fut.result().await.unwrap()
        }));
    }

    let mut results = Vec::new();
    for join in joins {
        results.push(join.await.unwrap());
    }
    results.sort_unstable();

    assert_eq!(results, (0..8).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= 2, "capacity bound violated");
    assert!(peak.load(Ordering::SeqCst) >= 1);

    ex.stop().await;
}

/// Job errors are stored verbatim in the future and survive re-reads.
#[tokio::test(flavor = "multi_thread")]
async fn errors_are_stored_verbatim() {
    let ex: BoundedExecutor<i64> = BoundedExecutor::new(1);

    let mut fut = ex
        .execute(|| async {
            Err(JobError::Fail {
                reason: "io".into(),
            })
        })
        .await
        .unwrap();

    let first = fut.result().await;
    let second = fut.result().await;
    assert_eq!(first, Err(JobError::Fail { reason: "io".into() }));
    assert_eq!(first, second);

    ex.stop().await;
}

/// `try_result` probes without blocking: `None` while the job runs,
/// `Some` once it completed.
#[tokio::test(flavor = "multi_thread")]
async fn try_result_probes_without_blocking() {
    let ex: BoundedExecutor<i64> = BoundedExecutor::new(1);

    let mut fut = ex
        .execute(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(7)
        })
        .await
        .unwrap();

    assert_eq!(fut.try_result(), None);
    assert_eq!(fut.result().await, Ok(7));
    assert_eq!(fut.try_result(), Some(Ok(7)));

    ex.stop().await;
}

/// A single-slot executor serialises jobs; both still complete correctly.
#[tokio::test(flavor = "multi_thread")]
async fn single_slot_serialises_jobs() {
    let ex: BoundedExecutor<i64> = BoundedExecutor::new(1);

    let mut f1 = ex
        .execute(|| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(10)
        })
        .await
        .unwrap();
    let mut f2 = ex.execute(|| async { Ok(20) }).await.unwrap();

    assert_eq!(f2.result().await, Ok(20));
    assert_eq!(f1.result().await, Ok(10));

    ex.stop().await;
}

/// Stop lets running jobs finish and fulfil their futures; submitting
/// afterwards fails with a typed error.
#[tokio::test(flavor = "multi_thread")]
async fn stop_drains_workers_and_closes_admission() {
    let ex: BoundedExecutor<i64> = BoundedExecutor::new(1);

    let mut fut = ex
        .execute(|| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(5)
        })
        .await
        .unwrap();

    ex.stop().await;
    assert_eq!(fut.result().await, Ok(5));

    let err = ex.execute(|| async { Ok(0) }).await.unwrap_err();
    assert!(matches!(err, RuntimeError::ExecutorClosed));

    // Idempotent stop.
    ex.stop().await;
}

/// `max` is clamped to at least one slot.
#[tokio::test(flavor = "multi_thread")]
async fn zero_capacity_is_clamped() {
    let ex: BoundedExecutor<i64> = BoundedExecutor::new(0);
    assert_eq!(ex.max(), 1);

    let mut fut = ex.execute(|| async { Ok(1) }).await.unwrap();
    assert_eq!(fut.result().await, Ok(1));

    ex.stop().await;
}
