use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use studio_core::PaymentAuthorization;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Booked,
    Waitlisted,
    WaitlistOffered,
    CheckedIn,
    Cancelled,
    LateCancelled,
    NoShow,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::LateCancelled | BookingStatus::NoShow
        )
    }

    /// Statuses that occupy a seat in the capacity count
    pub fn holds_seat(&self) -> bool {
        matches!(
            self,
            BookingStatus::Booked | BookingStatus::CheckedIn | BookingStatus::WaitlistOffered
        )
    }
}

/// How the seat is paid for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreditSource {
    Membership { membership_id: Uuid },
    DropIn { authorization: PaymentAuthorization },
}

impl CreditSource {
    pub fn membership(membership_id: Uuid) -> Self {
        CreditSource::Membership { membership_id }
    }

    pub fn drop_in(authorization: PaymentAuthorization) -> Self {
        CreditSource::DropIn { authorization }
    }
}

/// Who is asking for a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Member(Uuid),
    Staff,
}

/// A user's claim on a class session. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub source: CreditSource,
    pub status: BookingStatus,
    /// What the user paid, in cents, when known (drop-in amount or co-op member price)
    pub amount_paid_cents: Option<i64>,
    pub waitlist_position: Option<u64>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        session_id: Uuid,
        user_id: Uuid,
        source: CreditSource,
        status: BookingStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            source,
            status,
            amount_paid_cents: None,
            waitlist_position: None,
            hold_expires_at: None,
            checked_in_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `None` for drop-in bookings, which bypass the credit ledger
    pub fn membership_id(&self) -> Option<Uuid> {
        match &self.source {
            CreditSource::Membership { membership_id } => Some(*membership_id),
            CreditSource::DropIn { .. } => None,
        }
    }

    pub fn update_status(&mut self, status: BookingStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        if status != BookingStatus::WaitlistOffered {
            self.hold_expires_at = None;
        }
    }
}
