use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use engine_fault_tests::{
    poller::{PollVerdict, Poller},
    Error,
    Result,
};

use assert_matches::assert_matches;

fn counting_query(counter: &Arc<AtomicU32>) -> impl FnMut() -> futures::future::Ready<Result<u32>> {
    let counter = counter.clone();
    move || futures::future::ready(Ok(counter.fetch_add(1, Ordering::SeqCst) + 1))
}

#[tokio::test]
async fn converges_after_exactly_k_ticks() {
    let queries = Arc::new(AtomicU32::new(0));
    let poller = Poller::timeout(Duration::from_millis(5), Duration::from_secs(10));

    let outcome = poller
        .poll(counting_query(&queries), |n| *n == 4)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, PollVerdict::Converged);
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.last, Some(4));
    assert_eq!(queries.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn timeout_bounds_the_query_count() {
    let queries = Arc::new(AtomicU32::new(0));
    let interval = Duration::from_millis(10);
    let timeout = Duration::from_millis(35);
    let poller = Poller::timeout(interval, timeout);

    let outcome = poller
        .poll(counting_query(&queries), |_| false)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, PollVerdict::TimedOut);
    assert!(outcome.elapsed >= timeout);
    // No more than ceil(timeout / interval) + 1 queries.
    assert!(outcome.attempts >= 1 && outcome.attempts <= 5, "{}", outcome.attempts);
    assert_eq!(queries.load(Ordering::SeqCst), outcome.attempts);
}

#[tokio::test]
async fn attempt_budget_exhausts_exactly() {
    let queries = Arc::new(AtomicU32::new(0));
    let poller = Poller::attempts(Duration::from_millis(2), 3);

    let outcome = poller
        .poll(counting_query(&queries), |_| false)
        .await
        .unwrap();

    assert_eq!(outcome.verdict, PollVerdict::Exhausted);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(queries.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn expect_converged_turns_a_miss_into_a_timeout_error() {
    let poller = Poller::attempts(Duration::from_millis(2), 2);
    let outcome = poller
        .poll(
            || futures::future::ready(Ok::<u32, Error>(0)),
            |_| false,
        )
        .await
        .unwrap();

    let error = outcome.expect_converged("the impossible").unwrap_err();
    assert_matches!(error, Error::ConvergenceTimeout { attempts: 2, .. });
}

#[tokio::test]
async fn query_errors_propagate() {
    let poller = Poller::attempts(Duration::from_millis(2), 5);
    let result: Result<_> = poller
        .poll(
            || {
                futures::future::ready(Err::<u32, Error>(Error::CommandFailed {
                    command: "query".to_string(),
                    error: "connection refused".to_string(),
                }))
            },
            |_| true,
        )
        .await;
    assert_matches!(result, Err(Error::CommandFailed { .. }));
}
