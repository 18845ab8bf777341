use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::*;

#[test]
fn test_default_policy() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.min_delay, Duration::from_secs(1));
    assert_eq!(policy.max_delay, Duration::from_secs(5));
}

#[test]
fn test_new_normalizes_bounds() {
    let policy = RetryPolicy::new(0, Duration::from_secs(3), Duration::from_secs(1));
    assert_eq!(policy.max_attempts, 1);
    assert_eq!(policy.min_delay, Duration::from_secs(1));
    assert_eq!(policy.max_delay, Duration::from_secs(3));
}

#[test]
fn test_backoff_yields_one_delay_between_each_attempt() {
    let policy = RetryPolicy::new(4, Duration::from_millis(100), Duration::from_millis(300));
    let delays: Vec<_> = policy.build().collect();

    assert_eq!(delays.len(), 3);
    for delay in delays {
        assert!(delay >= Duration::from_millis(100), "{:?} too low", delay);
        assert!(delay <= Duration::from_millis(300), "{:?} too high", delay);
    }
}

#[test]
fn test_single_attempt_has_no_backoff() {
    let delays: Vec<_> = RetryPolicy::immediate(1).build().collect();
    assert!(delays.is_empty());
}

#[tokio::test]
async fn test_exactly_max_attempts_on_persistent_failure() {
    let calls = Arc::new(AtomicU32::new(0));
    let policy = RetryPolicy::immediate(3);
    let cancel = CancellationToken::new();

    let counter = Arc::clone(&calls);
    let result: Result<(), _> = policy
        .run(&cancel, "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("boom") }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match result {
        Err(RetryError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last, "boom");
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stops_after_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let policy = RetryPolicy::immediate(5);
    let cancel = CancellationToken::new();

    let counter = Arc::clone(&calls);
    let result = policy
        .run(&cancel, "test", || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(n)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_already_cancelled_makes_no_attempt() {
    let calls = Arc::new(AtomicU32::new(0));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let counter = Arc::clone(&calls);
    let result: Result<(), _> = RetryPolicy::immediate(3)
        .run(&cancel, "test", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("boom") }
        })
        .await;

    assert!(matches!(result, Err(RetryError::Cancelled)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff_wait() {
    let policy = RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(60));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result: Result<(), _> = tokio::time::timeout(
        Duration::from_secs(5),
        policy.run(&cancel, "test", || async { Err::<(), _>("boom") }),
    )
    .await
    .expect("cancellation should end the retry promptly");

    assert!(matches!(result, Err(RetryError::Cancelled)));
}
