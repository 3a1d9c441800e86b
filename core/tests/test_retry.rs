use std::time::Duration;

use capture_core::retry::RetryPolicy;

#[test]
fn delays_grow_exponentially_until_cap() {
    let policy = RetryPolicy::exponential(
        6,
        Duration::from_millis(50),
        Duration::from_millis(300),
    );
    let mut handle = policy.handle();

    let delays: Vec<_> = std::iter::from_fn(|| handle.next_delay()).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(50),
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(300), // capped
            Duration::from_millis(300),
        ]
    );
}

#[test]
fn budget_allows_max_attempts_total() {
    // max_attempts = 3 means one initial try plus two retries.
    let policy = RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_secs(1));
    let mut handle = policy.handle();

    assert!(handle.next_delay().is_some());
    assert!(handle.next_delay().is_some());
    assert!(handle.next_delay().is_none());
    assert_eq!(handle.attempts(), 2);
}

#[test]
fn single_attempt_policy_never_retries() {
    let policy = RetryPolicy::exponential(1, Duration::from_millis(10), Duration::from_secs(1));
    assert!(policy.handle().next_delay().is_none());
}

#[test]
fn jitter_stays_within_fraction() {
    let policy = RetryPolicy::exponential(2, Duration::from_millis(100), Duration::from_secs(1))
        .with_jitter(0.2);

    for _ in 0..50 {
        let delay = policy.handle().next_delay().unwrap();
        assert!(delay >= Duration::from_millis(80), "delay {:?}", delay);
        assert!(delay <= Duration::from_millis(120), "delay {:?}", delay);
    }
}

#[test]
fn zero_base_delay_yields_zero_delays() {
    let policy = RetryPolicy::exponential(4, Duration::ZERO, Duration::from_secs(1));
    let mut handle = policy.handle();
    assert_eq!(handle.next_delay(), Some(Duration::ZERO));
}
