use crate::error::BookingError;
use crate::models::{Booking, BookingStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    by_id: HashMap<Uuid, Booking>,
    /// (session, user) -> the one non-terminal booking
    active: HashMap<(Uuid, Uuid), Uuid>,
    by_session: HashMap<Uuid, Vec<Uuid>>,
}

/// Booking records. Writes for a session happen inside that session's
/// critical section; this lock only keeps the maps coherent.
#[derive(Default)]
pub struct BookingStore {
    inner: RwLock<Inner>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, booking: Booking) -> Result<(), BookingError> {
        let mut inner = self.inner.write();
        let key = (booking.session_id, booking.user_id);
        if !booking.status.is_terminal() {
            if inner.active.contains_key(&key) {
                return Err(BookingError::AlreadyBooked {
                    user_id: booking.user_id,
                    session_id: booking.session_id,
                });
            }
            inner.active.insert(key, booking.id);
        }
        inner.by_session.entry(booking.session_id).or_default().push(booking.id);
        inner.by_id.insert(booking.id, booking);
        Ok(())
    }

    pub fn get(&self, booking_id: &Uuid) -> Option<Booking> {
        self.inner.read().by_id.get(booking_id).cloned()
    }

    pub fn active_for(&self, session_id: &Uuid, user_id: &Uuid) -> Option<Booking> {
        let inner = self.inner.read();
        inner
            .active
            .get(&(*session_id, *user_id))
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    /// All bookings for a session in creation order
    pub fn for_session(&self, session_id: &Uuid) -> Vec<Booking> {
        let inner = self.inner.read();
        inner
            .by_session
            .get(session_id)
            .map(|ids| ids.iter().filter_map(|id| inner.by_id.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Conditional transition: applies only if the booking is currently in
    /// one of `from`. `edit` runs after the status change.
    pub fn transition<F>(
        &self,
        booking_id: &Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
        now: DateTime<Utc>,
        edit: F,
    ) -> Result<Booking, BookingError>
    where
        F: FnOnce(&mut Booking),
    {
        let mut inner = self.inner.write();
        let booking = inner
            .by_id
            .get_mut(booking_id)
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;

        if !from.contains(&booking.status) {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to,
            });
        }

        booking.update_status(to, now);
        edit(booking);
        let updated = booking.clone();

        if to.is_terminal() {
            inner.active.remove(&(updated.session_id, updated.user_id));
        }
        Ok(updated)
    }

    /// Offers whose hold has lapsed, as (session, booking) pairs
    pub fn expired_offers(&self, now: DateTime<Utc>) -> Vec<(Uuid, Uuid)> {
        self.inner
            .read()
            .by_id
            .values()
            .filter(|b| b.status == BookingStatus::WaitlistOffered)
            .filter(|b| b.hold_expires_at.map_or(false, |at| at <= now))
            .map(|b| (b.session_id, b.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreditSource;

    fn booking(session_id: Uuid, user_id: Uuid) -> Booking {
        Booking::new(
            session_id,
            user_id,
            CreditSource::membership(Uuid::new_v4()),
            BookingStatus::Booked,
            Utc::now(),
        )
    }

    #[test]
    fn test_one_active_booking_per_user_and_session() {
        let store = BookingStore::new();
        let session = Uuid::new_v4();
        let user = Uuid::new_v4();

        let first = booking(session, user);
        store.insert(first.clone()).unwrap();
        assert!(matches!(
            store.insert(booking(session, user)),
            Err(BookingError::AlreadyBooked { .. })
        ));

        store
            .transition(&first.id, &[BookingStatus::Booked], BookingStatus::Cancelled, Utc::now(), |_| {})
            .unwrap();
        assert!(store.active_for(&session, &user).is_none());
        store.insert(booking(session, user)).unwrap();
        assert_eq!(store.for_session(&session).len(), 2);
    }

    #[test]
    fn test_conditional_transition() {
        let store = BookingStore::new();
        let b = booking(Uuid::new_v4(), Uuid::new_v4());
        store.insert(b.clone()).unwrap();

        let err = store
            .transition(&b.id, &[BookingStatus::WaitlistOffered], BookingStatus::Cancelled, Utc::now(), |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            BookingError::InvalidTransition {
                from: BookingStatus::Booked,
                to: BookingStatus::Cancelled
            }
        );
        assert_eq!(store.get(&b.id).unwrap().status, BookingStatus::Booked);
    }
}
