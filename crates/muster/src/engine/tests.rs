use crate::{
    Blocking, Collect, CombineError, Error, FailurePolicy, Fold, FoldStrategy, MonotonicClock,
    Outcome, ScatterGather, Spawn, TokioClock, TokioSpawn,
};
use core::convert::Infallible;
use core::future::Future;
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::sleep;

async fn square(item: u64) -> Result<u64, Infallible> {
    Ok(item * item)
}

fn sum_fold<E: Send + 'static>()
-> Fold<u64, impl FnMut(&mut u64, Outcome<u64, E>) -> Result<(), CombineError> + Send + 'static> {
    Fold::new(0u64, |acc: &mut u64, outcome: Outcome<u64, E>| {
        if let Outcome::Success(value) = outcome {
            *acc += value;
        }
        Ok(())
    })
}

/// Fails item 2 quickly; every other item is much slower, so the failure is
/// always the first settlement.
async fn fail_item_two(item: u64) -> Result<u64, String> {
    if item == 2 {
        sleep(Duration::from_millis(1)).await;
        Err(format!("backend {item} unavailable"))
    } else {
        sleep(Duration::from_millis(500)).await;
        Ok(item)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn aggregate_is_identical_across_concurrency_limits() {
    const ITEMS: u64 = 64;
    let expected: u64 = (0..ITEMS).map(|i| i * i).sum();

    for limit in [1, 2, 4, 16, ITEMS as usize, 2 * ITEMS as usize] {
        for strategy in [FoldStrategy::Confined, FoldStrategy::Locked] {
            let engine = ScatterGather::new(limit).fold_strategy(strategy);
            let report = engine
                .run(0..ITEMS, square, sum_fold())
                .unwrap()
                .await
                .unwrap();
            assert_eq!(
                report.aggregate, expected,
                "limit {limit}, strategy {strategy:?}"
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn in_flight_never_exceeds_the_limit() {
    const LIMIT: usize = 4;
    const ITEMS: u64 = 32;

    #[derive(Default)]
    struct Gate {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    let gate = Arc::new(Gate::default());
    let observer = Arc::clone(&gate);

    let work = move |_: u64| {
        let gate = Arc::clone(&observer);
        async move {
            let now = gate.current.fetch_add(1, Ordering::SeqCst) + 1;
            gate.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            gate.current.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, Infallible>(1u64)
        }
    };

    let engine = ScatterGather::new(LIMIT);
    let handle = engine.run(0..ITEMS, work, sum_fold()).unwrap();
    let metrics = handle.metrics();
    let report = handle.await.unwrap();

    assert_eq!(report.aggregate, ITEMS);
    assert!(gate.peak.load(Ordering::SeqCst) <= LIMIT);
    assert_eq!(metrics.peak_in_flight(), LIMIT);
    assert_eq!(metrics.admitted(), ITEMS);
    assert_eq!(metrics.folded(), ITEMS);
    assert_eq!(metrics.discarded(), 0);
    assert_eq!(metrics.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn empty_input_completes_immediately_with_zero() {
    let engine = ScatterGather::with_runtime(4, TokioSpawn, TokioClock);
    let handle = engine
        .run(std::iter::empty::<u64>(), square, sum_fold())
        .unwrap();
    let metrics = handle.metrics();
    let report = handle.await.unwrap();

    assert_eq!(report.aggregate, 0);
    assert_eq!(report.elapsed, Duration::ZERO);
    assert_eq!(metrics.admitted(), 0);
}

#[tokio::test]
async fn zero_limit_is_rejected_before_any_work_starts() {
    let started = Arc::new(AtomicUsize::new(0));
    let witness = Arc::clone(&started);
    let work = move |_: u64| {
        let witness = Arc::clone(&witness);
        async move {
            witness.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(0u64)
        }
    };

    let engine = ScatterGather::new(0);
    let result = engine.run(0..8u64, work, sum_fold());

    assert!(matches!(result, Err(Error::InvalidConcurrency { limit: 0 })));
    assert_eq!(started.load(Ordering::SeqCst), 0);
}

async fn run_fail_fast(strategy: FoldStrategy) {
    const LIMIT: usize = 4;

    let folds = Arc::new(AtomicUsize::new(0));
    let fold_witness = Arc::clone(&folds);
    let aggregate = Fold::new(0u64, move |acc: &mut u64, outcome: Outcome<u64, String>| {
        fold_witness.fetch_add(1, Ordering::SeqCst);
        if let Outcome::Success(value) = outcome {
            *acc += value;
        }
        Ok(())
    });

    let engine = ScatterGather::with_runtime(LIMIT, TokioSpawn, TokioClock).fold_strategy(strategy);
    let handle = engine.run(0..16u64, fail_item_two, aggregate).unwrap();
    let metrics = handle.metrics();
    let failure = handle.await.unwrap_err();

    match failure.cause {
        Error::WorkUnit(cause) => assert_eq!(cause, "backend 2 unavailable"),
        other => panic!("unexpected cause: {other}"),
    }
    assert_eq!(failure.elapsed, Duration::from_millis(1));

    // The failure was the first settlement, so nothing was folded, and the
    // rest of the window was cancelled and discarded.
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(folds.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.folded(), 0);
    assert_eq!(metrics.discarded(), LIMIT as u64 - 1);
    assert_eq!(metrics.admitted(), LIMIT as u64);
}

#[tokio::test(start_paused = true)]
async fn fail_fast_carries_the_first_failure_confined() {
    run_fail_fast(FoldStrategy::Confined).await;
}

#[tokio::test(start_paused = true)]
async fn fail_fast_carries_the_first_failure_locked() {
    run_fail_fast(FoldStrategy::Locked).await;
}

async fn run_fail_soft(strategy: FoldStrategy) {
    const ITEMS: u64 = 16;

    let work = |item: u64| async move {
        sleep(Duration::from_millis(10)).await;
        if item == 2 {
            Err(format!("backend {item} unavailable"))
        } else {
            Ok(item)
        }
    };

    let engine = ScatterGather::with_runtime(4, TokioSpawn, TokioClock)
        .failure_policy(FailurePolicy::FailSoft)
        .fold_strategy(strategy);
    let report = engine
        .run(0..ITEMS, work, Collect::new())
        .unwrap()
        .await
        .unwrap();

    let outcomes = report.aggregate;
    assert_eq!(outcomes.len(), ITEMS as usize);
    assert_eq!(outcomes.iter().filter(|o| o.is_failure()).count(), 1);

    let sum: u64 = outcomes.into_iter().filter_map(Outcome::success).sum();
    assert_eq!(sum, (0..ITEMS).sum::<u64>() - 2);
}

#[tokio::test(start_paused = true)]
async fn fail_soft_records_failures_alongside_successes_confined() {
    run_fail_soft(FoldStrategy::Confined).await;
}

#[tokio::test(start_paused = true)]
async fn fail_soft_records_failures_alongside_successes_locked() {
    run_fail_soft(FoldStrategy::Locked).await;
}

#[tokio::test(start_paused = true)]
async fn elapsed_time_scales_with_the_admission_window() {
    const ITEMS: u64 = 8;
    const LATENCY: Duration = Duration::from_millis(10);

    let work = |_: u64| async move {
        sleep(LATENCY).await;
        Ok::<_, Infallible>(1u64)
    };

    // Halving the window doubles the makespan until the window covers every
    // item; widening it further buys nothing.
    let mut last = Duration::MAX;
    for (limit, expected_ms) in [(1, 80), (2, 40), (4, 20), (8, 10), (16, 10)] {
        let engine = ScatterGather::with_runtime(limit, TokioSpawn, TokioClock);
        let report = engine.run(0..ITEMS, work, sum_fold()).unwrap().await.unwrap();
        assert_eq!(report.elapsed, Duration::from_millis(expected_ms), "limit {limit}");
        assert!(report.elapsed <= last);
        last = report.elapsed;
    }

    // Slower items stretch the makespan monotonically.
    let slow = |_: u64| async move {
        sleep(LATENCY * 2).await;
        Ok::<_, Infallible>(1u64)
    };
    let engine = ScatterGather::with_runtime(1, TokioSpawn, TokioClock);
    let report = engine.run(0..ITEMS, slow, sum_fold()).unwrap().await.unwrap();
    assert_eq!(report.elapsed, Duration::from_millis(160));
}

#[tokio::test(start_paused = true)]
async fn sequential_runs_settle_in_input_order() {
    let work = |item: u64| async move {
        sleep(Duration::from_millis(1)).await;
        Ok::<_, Infallible>(item)
    };

    let engine = ScatterGather::with_runtime(1, TokioSpawn, TokioClock);
    let report = engine
        .run(0..8u64, work, Collect::new())
        .unwrap()
        .await
        .unwrap();

    let settled: Vec<u64> = report
        .aggregate
        .into_iter()
        .filter_map(Outcome::success)
        .collect();
    assert_eq!(settled, (0..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn a_panicking_work_unit_fails_the_run_without_unwinding() {
    let work = |item: u64| async move {
        if item == 3 {
            panic!("simulated defect");
        }
        Ok::<_, String>(item)
    };

    let engine = ScatterGather::new(2).failure_policy(FailurePolicy::FailSoft);
    let failure = engine
        .run(0..8u64, work, Collect::new())
        .unwrap()
        .await
        .unwrap_err();

    match failure.cause {
        Error::WorkUnitPanic(message) => assert!(message.contains("simulated defect")),
        other => panic!("unexpected cause: {other}"),
    }
}

#[tokio::test]
async fn a_failing_combine_is_fatal_even_under_fail_soft() {
    let aggregate = Fold::new(0u64, |_: &mut u64, _: Outcome<u64, Infallible>| {
        Err::<(), CombineError>("aggregate full".into())
    });

    let engine = ScatterGather::new(4).failure_policy(FailurePolicy::FailSoft);
    let failure = engine
        .run(0..8u64, square, aggregate)
        .unwrap()
        .await
        .unwrap_err();

    assert!(matches!(failure.cause, Error::Aggregation(_)));
}

#[tokio::test]
async fn a_panicking_combine_is_reported_as_an_aggregation_error() {
    let aggregate = Fold::new(0u64, |_: &mut u64, _: Outcome<u64, Infallible>| -> Result<(), CombineError> {
        panic!("fold invariant broken");
    });

    let engine = ScatterGather::new(4);
    let failure = engine
        .run(0..8u64, square, aggregate)
        .unwrap()
        .await
        .unwrap_err();

    match failure.cause {
        Error::Aggregation(err) => {
            let message = err.to_string();
            assert!(message.contains("combine panicked"), "got: {message}");
        }
        other => panic!("unexpected cause: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_work_units_settle_like_async_ones() {
    let work = Blocking::new(|item: u64| {
        std::thread::sleep(Duration::from_millis(1));
        Ok::<_, Infallible>(item * 2)
    });

    let engine = ScatterGather::new(4);
    let report = engine.run(0..16u64, work, sum_fold()).unwrap().await.unwrap();

    assert_eq!(report.aggregate, (0..16u64).map(|i| i * 2).sum::<u64>());
}

/// An execution context that silently drops every task it is handed.
#[derive(Clone, Copy)]
struct NullSpawn;

impl Spawn for NullSpawn {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(fut);
    }
}

#[tokio::test]
async fn a_context_that_drops_the_driver_resolves_disconnected() {
    let engine = ScatterGather::with_runtime(2, NullSpawn, MonotonicClock);
    let failure = engine
        .run(0..4u64, square, sum_fold())
        .unwrap()
        .await
        .unwrap_err();

    assert!(matches!(failure.cause, Error::Disconnected));
}
