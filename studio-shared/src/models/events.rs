use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Booking-state events published after a transition commits.
///
/// Collaborators (mailers, SMS, transaction recorders) react to these; the
/// engine never waits for them to be delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    BookingConfirmed {
        booking_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    Waitlisted {
        booking_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        position: u64,
        timestamp: DateTime<Utc>,
    },
    WaitlistOfferIssued {
        booking_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        hold_expires_at: DateTime<Utc>,
    },
    WaitlistOfferExpired {
        booking_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    WaitlistLeft {
        booking_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    CancellationProcessed {
        booking_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        late: bool,
        refunded: bool,
        timestamp: DateTime<Utc>,
    },
    CheckedIn {
        booking_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    CheckInUndone {
        booking_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    NoShowRecorded {
        booking_id: Uuid,
        session_id: Uuid,
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    SessionCancelled {
        session_id: Uuid,
        affected_bookings: usize,
        timestamp: DateTime<Utc>,
    },
    CoopSettled {
        booking_id: Uuid,
        session_id: Uuid,
        studio_share_cents: i64,
        teacher_share_cents: i64,
        timestamp: DateTime<Utc>,
    },
}

impl BookingEvent {
    /// Session the event belongs to, used as the partition key downstream.
    pub fn session_id(&self) -> Uuid {
        match self {
            BookingEvent::BookingConfirmed { session_id, .. }
            | BookingEvent::Waitlisted { session_id, .. }
            | BookingEvent::WaitlistOfferIssued { session_id, .. }
            | BookingEvent::WaitlistOfferExpired { session_id, .. }
            | BookingEvent::WaitlistLeft { session_id, .. }
            | BookingEvent::CancellationProcessed { session_id, .. }
            | BookingEvent::CheckedIn { session_id, .. }
            | BookingEvent::CheckInUndone { session_id, .. }
            | BookingEvent::NoShowRecorded { session_id, .. }
            | BookingEvent::SessionCancelled { session_id, .. }
            | BookingEvent::CoopSettled { session_id, .. } => *session_id,
        }
    }

    /// Short dotted name, e.g. `booking.confirmed`.
    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::BookingConfirmed { .. } => "booking.confirmed",
            BookingEvent::Waitlisted { .. } => "booking.waitlisted",
            BookingEvent::WaitlistOfferIssued { .. } => "waitlist.offer_issued",
            BookingEvent::WaitlistOfferExpired { .. } => "waitlist.offer_expired",
            BookingEvent::WaitlistLeft { .. } => "waitlist.left",
            BookingEvent::CancellationProcessed { .. } => "booking.cancelled",
            BookingEvent::CheckedIn { .. } => "booking.checked_in",
            BookingEvent::CheckInUndone { .. } => "booking.check_in_undone",
            BookingEvent::NoShowRecorded { .. } => "booking.no_show",
            BookingEvent::SessionCancelled { .. } => "session.cancelled",
            BookingEvent::CoopSettled { .. } => "coop.settled",
        }
    }
}
