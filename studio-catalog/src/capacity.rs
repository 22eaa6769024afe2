use crate::session::ClassSession;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use studio_core::{KeyedLocks, LockError};
use studio_waitlist::Waitlist;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Outcome of a reservation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Reserved,
    Full,
}

/// Seat accounting for one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatCount {
    capacity: u32,
    booked: u32,
}

impl SeatCount {
    pub fn new(capacity: u32) -> Self {
        Self { capacity, booked: 0 }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn booked(&self) -> u32 {
        self.booked
    }

    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.booked)
    }

    pub fn try_reserve(&mut self) -> Result<Reservation, CapacityError> {
        if self.booked > self.capacity {
            return Err(CapacityError::OverBooked {
                capacity: self.capacity,
                booked: self.booked,
            });
        }
        if self.booked == self.capacity {
            return Ok(Reservation::Full);
        }
        self.booked += 1;
        Ok(Reservation::Reserved)
    }

    pub fn release(&mut self) -> Result<(), CapacityError> {
        if self.booked == 0 {
            return Err(CapacityError::ReleaseUnderflow);
        }
        self.booked -= 1;
        Ok(())
    }

    /// Staff resize. Never below the current booked count.
    pub fn resize(&mut self, new_capacity: u32) -> Result<(), CapacityError> {
        if new_capacity == 0 || new_capacity < self.booked {
            return Err(CapacityError::InvalidCapacity {
                requested: new_capacity,
                booked: self.booked,
            });
        }
        self.capacity = new_capacity;
        Ok(())
    }
}

/// Everything serialized by one session's critical section.
#[derive(Debug)]
pub struct SessionSlot {
    pub session: ClassSession,
    pub seats: SeatCount,
    pub waitlist: Waitlist,
}

impl SessionSlot {
    pub fn new(session: ClassSession) -> Self {
        Self {
            seats: SeatCount::new(session.capacity),
            waitlist: Waitlist::new(session.id),
            session,
        }
    }

    pub fn try_reserve(&mut self) -> Result<Reservation, CapacityError> {
        self.seats.try_reserve()
    }

    /// Free a seat. Returns true iff someone is waiting and a promotion
    /// should follow.
    pub fn release(&mut self) -> Result<bool, CapacityError> {
        self.seats.release()?;
        Ok(!self.waitlist.is_empty())
    }

    pub fn resize(&mut self, new_capacity: u32) -> Result<(), CapacityError> {
        self.seats.resize(new_capacity)?;
        self.session.capacity = new_capacity;
        Ok(())
    }

    pub fn snapshot(&self) -> SeatSnapshot {
        SeatSnapshot {
            session_id: self.session.id,
            capacity: self.seats.capacity(),
            booked: self.seats.booked(),
            waitlisted: self.waitlist.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatSnapshot {
    pub session_id: Uuid,
    pub capacity: u32,
    pub booked: u32,
    pub waitlisted: usize,
}

pub type SessionGuard = OwnedMutexGuard<SessionSlot>;

/// Per-session seat accounting with one exclusive section per session id.
pub struct CapacityTracker {
    sessions: KeyedLocks<SessionSlot>,
}

impl CapacityTracker {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            sessions: KeyedLocks::new("session", lock_timeout),
        }
    }

    /// Start tracking a newly scheduled session
    pub fn register(&self, session: ClassSession) -> Result<(), CapacityError> {
        if session.capacity == 0 {
            return Err(CapacityError::InvalidCapacity {
                requested: 0,
                booked: 0,
            });
        }
        let id = session.id;
        if !self.sessions.insert(id, SessionSlot::new(session)) {
            return Err(CapacityError::AlreadyScheduled(id.to_string()));
        }
        tracing::info!(session_id = %id, "Session registered with capacity tracker");
        Ok(())
    }

    /// Enter the session's critical section. Held across a whole engine
    /// operation so reserve, release and promotion stay totally ordered.
    pub async fn lock(&self, session_id: &Uuid) -> Result<SessionGuard, CapacityError> {
        Ok(self.sessions.lock(session_id).await?)
    }

    pub async fn snapshot(&self, session_id: &Uuid) -> Result<SeatSnapshot, CapacityError> {
        Ok(self.lock(session_id).await?.snapshot())
    }

    pub fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.keys()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already scheduled: {0}")]
    AlreadyScheduled(String),

    #[error("Session busy: {0}")]
    Busy(String),

    #[error("Invalid capacity {requested}: {booked} seats already booked")]
    InvalidCapacity { requested: u32, booked: u32 },

    #[error("Over-book detected: {booked} booked against capacity {capacity}")]
    OverBooked { capacity: u32, booked: u32 },

    #[error("Seat released with nothing booked")]
    ReleaseUnderflow,
}

impl From<LockError> for CapacityError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::NotFound { key, .. } => CapacityError::NotFound(key.to_string()),
            LockError::Busy { key, .. } => CapacityError::Busy(key.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn session(capacity: u32) -> ClassSession {
        ClassSession::new(Utc::now(), 60, capacity, "Studio A", Uuid::new_v4())
    }

    #[test]
    fn test_seat_lifecycle() {
        let mut seats = SeatCount::new(2);

        assert_eq!(seats.try_reserve().unwrap(), Reservation::Reserved);
        assert_eq!(seats.try_reserve().unwrap(), Reservation::Reserved);
        assert_eq!(seats.try_reserve().unwrap(), Reservation::Full);
        assert_eq!(seats.available(), 0);

        seats.release().unwrap();
        assert_eq!(seats.booked(), 1);
        seats.release().unwrap();
        assert_eq!(seats.release(), Err(CapacityError::ReleaseUnderflow));
    }

    #[test]
    fn test_resize_below_booked_rejected() {
        let mut seats = SeatCount::new(3);
        seats.try_reserve().unwrap();
        seats.try_reserve().unwrap();

        assert_eq!(
            seats.resize(1),
            Err(CapacityError::InvalidCapacity { requested: 1, booked: 2 })
        );
        assert_eq!(seats.capacity(), 3);

        seats.resize(2).unwrap();
        assert_eq!(seats.capacity(), 2);
        assert!(seats.resize(0).is_err());
    }

    #[test]
    fn test_release_signals_pending_waitlist() {
        let mut slot = SessionSlot::new(session(1));
        slot.try_reserve().unwrap();
        assert!(!slot.release().unwrap());

        slot.try_reserve().unwrap();
        slot.waitlist
            .enqueue(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .unwrap();
        assert!(slot.release().unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_last_seat() {
        let tracker = Arc::new(CapacityTracker::new(Duration::from_secs(2)));
        let session = session(1);
        let session_id = session.id;
        tracker.register(session).unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.lock(&session_id).await.unwrap().try_reserve().unwrap()
            }));
        }

        let mut reserved = 0;
        for handle in handles {
            if handle.await.unwrap() == Reservation::Reserved {
                reserved += 1;
            }
        }

        assert_eq!(reserved, 1);
        assert_eq!(tracker.snapshot(&session_id).await.unwrap().booked, 1);
    }

    #[test]
    fn test_register_rejects_zero_and_duplicates() {
        let tracker = CapacityTracker::new(Duration::from_millis(50));
        assert!(tracker.register(session(0)).is_err());

        let s = session(4);
        tracker.register(s.clone()).unwrap();
        assert_eq!(
            tracker.register(s.clone()),
            Err(CapacityError::AlreadyScheduled(s.id.to_string()))
        );
        assert_eq!(tracker.session_ids(), vec![s.id]);
    }
}
