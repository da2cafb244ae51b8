//! Retry policy for status appends.
//!
//! Built on the `backon` crate. The safe-write protocol drives the policy
//! through an explicit loop rather than a combinator, because every attempt
//! must first pass a staleness check against the cache entry's current
//! sequence ticket, a condition no error-predicate combinator can express.
//!
//! | Policy | Min Delay | Max Delay | Attempts |
//! |--------|-----------|-----------|----------|
//! | `send_policy` | 50ms | 5s | unbounded |
//!
//! Attempts are unbounded: a retriable produce failure keeps
//! retrying until the write succeeds or a fresher write for the same key
//! supersedes it. If the broker stays unreachable this loops forever; each
//! attempt logs at warn level with its attempt count so the condition is
//! observable.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Policy for re-sending a failed status append.
pub fn send_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(5))
        .without_max_times()
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::BackoffBuilder;

    #[test]
    fn delays_ramp_and_never_run_out() {
        let mut delays = send_policy().build();
        for _ in 0..100 {
            let delay = delays.next().expect("policy must be unbounded");
            assert!(delay <= Duration::from_secs(10));
        }
    }
}
