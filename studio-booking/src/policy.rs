use crate::models::Booking;
use chrono::{DateTime, Duration, Utc};
use studio_catalog::{ClassSession, SessionStatus};
use studio_waitlist::HoldPolicy;

/// Studio-configured timing rules. Nothing here is hard-coded in the engine.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub hold: HoldPolicy,
    pub cancellation: CancellationPolicy,
    /// How early before class start check-in opens
    pub checkin_opens_before: Duration,
    pub lock_timeout: std::time::Duration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            hold: HoldPolicy::default(),
            cancellation: CancellationPolicy::default(),
            checkin_opens_before: Duration::hours(2),
            lock_timeout: std::time::Duration::from_secs(2),
        }
    }
}

impl BookingPolicy {
    /// Check-in is open from `start - checkin_opens_before` until class end
    pub fn checkin_open(&self, session: &ClassSession, now: DateTime<Utc>) -> bool {
        now >= session.start_time - self.checkin_opens_before && !session.has_ended(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationOutcome {
    OnTime,
    Late,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationPolicy {
    pub cutoff: Duration,
}

impl CancellationPolicy {
    pub fn new(cutoff: Duration) -> Self {
        Self { cutoff }
    }

    /// On time iff `now <= start - cutoff`. Studio-cancelled sessions are
    /// always on time.
    pub fn evaluate(&self, booking: &Booking, session: &ClassSession, now: DateTime<Utc>) -> CancellationOutcome {
        let outcome = if session.status == SessionStatus::CancelledByStudio
            || now <= session.start_time - self.cutoff
        {
            CancellationOutcome::OnTime
        } else {
            CancellationOutcome::Late
        };
        tracing::debug!(booking_id = %booking.id, ?outcome, "Cancellation evaluated");
        outcome
    }
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, CreditSource};
    use uuid::Uuid;

    fn fixture(start: DateTime<Utc>) -> (Booking, ClassSession) {
        let session = ClassSession::new(start, 60, 10, "Studio A", Uuid::new_v4());
        let booking = Booking::new(
            session.id,
            Uuid::new_v4(),
            CreditSource::membership(Uuid::new_v4()),
            BookingStatus::Booked,
            start - Duration::days(1),
        );
        (booking, session)
    }

    #[test]
    fn test_cutoff_boundary() {
        let start = Utc::now() + Duration::days(1);
        let (booking, session) = fixture(start);
        let policy = CancellationPolicy::default();

        assert_eq!(policy.evaluate(&booking, &session, start - Duration::hours(3)), CancellationOutcome::OnTime);
        assert_eq!(policy.evaluate(&booking, &session, start - Duration::hours(2)), CancellationOutcome::OnTime);
        assert_eq!(policy.evaluate(&booking, &session, start - Duration::hours(1)), CancellationOutcome::Late);
    }

    #[test]
    fn test_studio_cancellation_always_on_time() {
        let start = Utc::now();
        let (booking, mut session) = fixture(start);
        session.status = SessionStatus::CancelledByStudio;

        let policy = CancellationPolicy::default();
        assert_eq!(policy.evaluate(&booking, &session, start + Duration::minutes(5)), CancellationOutcome::OnTime);
    }

    #[test]
    fn test_checkin_window() {
        let start = Utc::now();
        let (_, session) = fixture(start);
        let policy = BookingPolicy::default();

        assert!(!policy.checkin_open(&session, start - Duration::hours(3)));
        assert!(policy.checkin_open(&session, start - Duration::hours(2)));
        assert!(policy.checkin_open(&session, start + Duration::minutes(30)));
        assert!(!policy.checkin_open(&session, start + Duration::minutes(60)));
    }
}
