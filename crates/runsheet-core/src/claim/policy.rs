//! Claim policy: settle interval and retry budget.

use std::time::Duration;

/// Tunables of the claim protocol.
///
/// The backend has no atomic "write if unclaimed", so a claimer writes its
/// token, waits `settle_interval`, and re-reads. The wait is the only thing
/// standing between two concurrent claimers; a longer interval catches slower
/// propagation but makes every claim slower. It is a probabilistic margin,
/// never a guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPolicy {
    /// Wait between writing the worker token and verifying it.
    pub settle_interval: Duration,

    /// How many more runs to try after a claim is lost to another worker.
    pub retry_budget: u32,
}

impl ClaimPolicy {
    pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_RETRY_BUDGET: u32 = 3;

    pub fn new(settle_interval: Duration, retry_budget: u32) -> Self {
        Self {
            settle_interval,
            retry_budget,
        }
    }

    /// Claim attempts made before giving up (first try + retries).
    pub fn max_attempts(&self) -> u32 {
        self.retry_budget.saturating_add(1)
    }
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SETTLE_INTERVAL, Self::DEFAULT_RETRY_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_waits_two_seconds_and_retries_three_times() {
        let policy = ClaimPolicy::default();
        assert_eq!(policy.settle_interval, Duration::from_secs(2));
        assert_eq!(policy.retry_budget, 3);
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn max_attempts_saturates() {
        let policy = ClaimPolicy::new(Duration::ZERO, u32::MAX);
        assert_eq!(policy.max_attempts(), u32::MAX);
    }
}
