use crate::models::BookingStatus;
use crate::settlement::SettlementError;
use studio_catalog::CapacityError;
use studio_ledger::LedgerError;
use studio_waitlist::WaitlistError;
use uuid::Uuid;

/// How a caller should treat an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected outcome, report to the user, do not retry
    PolicyRejection,
    /// Lock timeout, retry with backoff
    Contention,
    /// Internal consistency failure, halt and page an operator
    InvariantViolation,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("Session is full: {0}")]
    Full(Uuid),

    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    #[error("Membership expired: {0}")]
    MembershipExpired(String),

    #[error("Waitlist offer expired: {0}")]
    OfferExpired(Uuid),

    #[error("User {user_id} already holds a booking for session {session_id}")]
    AlreadyBooked { user_id: Uuid, session_id: Uuid },

    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Session locked: {0}")]
    SessionLocked(String),

    #[error("Invalid capacity {requested}: {booked} seats already booked")]
    InvalidCapacity { requested: u32, booked: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0} does not belong to the requesting member")]
    NotOwner(Uuid),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Booking {0} has nothing to settle")]
    NotSettleable(Uuid),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Session is not a co-op class: {0}")]
    NotCoop(Uuid),

    #[error("No rental agreement in effect: {0}")]
    AgreementNotEffective(String),

    #[error("Busy, retry later: {0}")]
    Busy(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl BookingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BookingError::Busy(_) => ErrorClass::Contention,
            BookingError::InvariantViolation(_) => ErrorClass::InvariantViolation,
            _ => ErrorClass::PolicyRejection,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Contention
    }
}

impl From<CapacityError> for BookingError {
    fn from(err: CapacityError) -> Self {
        match err {
            CapacityError::NotFound(id) => BookingError::NotFound(format!("session {}", id)),
            CapacityError::AlreadyScheduled(id) => BookingError::Duplicate(format!("session {}", id)),
            CapacityError::Busy(id) => BookingError::Busy(format!("session {}", id)),
            CapacityError::InvalidCapacity { requested, booked } => {
                BookingError::InvalidCapacity { requested, booked }
            }
            e @ (CapacityError::OverBooked { .. } | CapacityError::ReleaseUnderflow) => {
                BookingError::InvariantViolation(e.to_string())
            }
        }
    }
}

impl From<LedgerError> for BookingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => BookingError::NotFound(format!("membership {}", id)),
            LedgerError::Busy(id) => BookingError::Busy(format!("membership {}", id)),
            e @ LedgerError::InsufficientCredits { .. } => BookingError::InsufficientCredits(e.to_string()),
            LedgerError::MembershipExpired(id) => BookingError::MembershipExpired(id),
            e @ LedgerError::BalanceMismatch { .. } => BookingError::InvariantViolation(e.to_string()),
            LedgerError::AlreadyExists(id) => BookingError::Duplicate(format!("membership {}", id)),
            // Refund and reason errors only arise from engine bugs
            e @ (LedgerError::NothingToRefund(_)
            | LedgerError::InvalidReason(_)
            | LedgerError::InvalidAdjustment(_)) => BookingError::InvariantViolation(e.to_string()),
        }
    }
}

impl From<SettlementError> for BookingError {
    fn from(err: SettlementError) -> Self {
        BookingError::InvariantViolation(err.to_string())
    }
}

impl From<WaitlistError> for BookingError {
    fn from(err: WaitlistError) -> Self {
        match err {
            WaitlistError::NotQueued(user) => BookingError::NotFound(format!("waitlist entry for {}", user)),
            e @ WaitlistError::AlreadyQueued(_) => BookingError::InvariantViolation(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(BookingError::Busy("x".into()).is_retryable());
        assert_eq!(BookingError::Full(Uuid::nil()).class(), ErrorClass::PolicyRejection);
        assert_eq!(
            BookingError::from(CapacityError::ReleaseUnderflow).class(),
            ErrorClass::InvariantViolation
        );
        assert_eq!(
            BookingError::from(LedgerError::MembershipExpired("m".into())),
            BookingError::MembershipExpired("m".into())
        );
        assert!(!BookingError::from(LedgerError::Busy("m".into())).class().eq(&ErrorClass::PolicyRejection));
    }
}
