pub mod worker;

use chrono::Duration;
use studio_booking::{BookingPolicy, CancellationPolicy};
use studio_store::BusinessRules;
use studio_waitlist::HoldPolicy;

pub use worker::{start_sweep_worker, sweep_once};

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(u64::from(u32::MAX)) as i64)
}

/// Engine timing rules from the `business_rules` config section
pub fn booking_policy(rules: &BusinessRules) -> BookingPolicy {
    BookingPolicy {
        hold: HoldPolicy::new(seconds(rules.waitlist_hold_seconds)),
        cancellation: CancellationPolicy::new(seconds(rules.cancellation_cutoff_seconds)),
        checkin_opens_before: seconds(rules.checkin_opens_seconds),
        lock_timeout: rules.lock_timeout(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_business_rules() {
        let rules = BusinessRules {
            waitlist_hold_seconds: 600,
            cancellation_cutoff_seconds: 43_200,
            checkin_opens_seconds: 1800,
            lock_timeout_ms: 250,
        };
        let policy = booking_policy(&rules);

        assert_eq!(policy.hold.hold_duration, Duration::minutes(10));
        assert_eq!(policy.cancellation.cutoff, Duration::hours(12));
        assert_eq!(policy.checkin_opens_before, Duration::minutes(30));
        assert_eq!(policy.lock_timeout, std::time::Duration::from_millis(250));
    }
}
