use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};
use crate::pricing::CoopPricing;

/// Session lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    CancelledByStudio,
    Completed,
}

/// A single scheduled occurrence of a class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub capacity: u32,
    pub location: String,
    pub teacher_id: Uuid,
    /// Present only for co-op (rental) classes
    pub coop: Option<CoopPricing>,
    pub status: SessionStatus,
}

impl ClassSession {
    pub fn new(
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        capacity: u32,
        location: impl Into<String>,
        teacher_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time,
            duration_minutes,
            capacity,
            location: location.into(),
            teacher_id,
            coop: None,
            status: SessionStatus::Scheduled,
        }
    }

    pub fn with_coop(mut self, pricing: CoopPricing) -> Self {
        self.coop = Some(pricing);
        self
    }

    pub fn is_coop(&self) -> bool {
        self.coop.is_some()
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time()
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == SessionStatus::Scheduled
    }

    /// Credits consumed by a member booking
    pub fn credits_required(&self) -> u32 {
        self.coop.as_ref().map_or(1, |c| c.credits_required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_timing() {
        let start = Utc::now();
        let session = ClassSession::new(start, 60, 12, "Studio A", Uuid::new_v4());

        assert_eq!(session.end_time(), start + Duration::hours(1));
        assert!(!session.has_started(start - Duration::seconds(1)));
        assert!(session.has_started(start));
        assert!(!session.has_ended(start + Duration::minutes(59)));
        assert!(session.has_ended(start + Duration::minutes(60)));
        assert_eq!(session.credits_required(), 1);
        assert!(!session.is_coop());
    }

    #[test]
    fn test_coop_credits_required() {
        let session = ClassSession::new(Utc::now(), 75, 8, "Studio B", Uuid::new_v4())
            .with_coop(CoopPricing::new(2500, 2000, 2));

        assert!(session.is_coop());
        assert_eq!(session.credits_required(), 2);
    }
}
