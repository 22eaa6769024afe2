use chrono::{DateTime, Duration, Utc};

/// How long a promoted user has to claim the freed seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldPolicy {
    pub hold_duration: Duration,
}

impl HoldPolicy {
    pub fn new(hold_duration: Duration) -> Self {
        Self { hold_duration }
    }

    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.hold_duration
    }

    /// An offer is claimable only while `now < hold_expires_at`.
    pub fn is_expired(hold_expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        hold_expires_at <= now
    }
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(15))
    }
}
