use crate::models::WaitlistEntry;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

/// FIFO line for a single class session.
///
/// Not synchronized on its own: it lives inside the session's critical
/// section next to the seat count, so promotions are ordered with
/// reservations and releases.
#[derive(Debug, Clone)]
pub struct Waitlist {
    session_id: Uuid,
    next_position: u64,
    entries: BTreeMap<u64, WaitlistEntry>,
}

impl Waitlist {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            next_position: 1,
            entries: BTreeMap::new(),
        }
    }

    /// Append a user to the line and return their position.
    pub fn enqueue(
        &mut self,
        user_id: Uuid,
        booking_id: Uuid,
        joined_at: DateTime<Utc>,
    ) -> Result<u64, WaitlistError> {
        if self.position_of(&user_id).is_some() {
            return Err(WaitlistError::AlreadyQueued(user_id.to_string()));
        }

        let position = self.next_position;
        self.next_position += 1;
        self.entries.insert(
            position,
            WaitlistEntry {
                session_id: self.session_id,
                user_id,
                booking_id,
                position,
                joined_at,
            },
        );
        Ok(position)
    }

    /// Pop the lowest position still present. `None` means no promotion is needed.
    pub fn promote_next(&mut self) -> Option<WaitlistEntry> {
        let (_, entry) = self.entries.pop_first()?;
        tracing::debug!(
            session_id = %self.session_id,
            user_id = %entry.user_id,
            position = entry.position,
            "Promoting waitlist entry"
        );
        Some(entry)
    }

    /// Remove a specific user. Other positions are left untouched.
    pub fn leave(&mut self, user_id: &Uuid) -> Result<WaitlistEntry, WaitlistError> {
        let position = self
            .position_of(user_id)
            .ok_or_else(|| WaitlistError::NotQueued(user_id.to_string()))?;
        self.entries
            .remove(&position)
            .ok_or_else(|| WaitlistError::NotQueued(user_id.to_string()))
    }

    pub fn position_of(&self, user_id: &Uuid) -> Option<u64> {
        self.entries
            .values()
            .find(|e| e.user_id == *user_id)
            .map(|e| e.position)
    }

    /// Remove and return every entry in line order.
    pub fn drain(&mut self) -> Vec<WaitlistEntry> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitlistError {
    #[error("User already on waitlist: {0}")]
    AlreadyQueued(String),

    #[error("User not on waitlist: {0}")]
    NotQueued(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_by_sequence() {
        let mut waitlist = Waitlist::new(Uuid::new_v4());
        let now = Utc::now();
        let users: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        // Same timestamp for everyone: order must come from the sequence alone
        for user in &users {
            waitlist.enqueue(*user, Uuid::new_v4(), now).unwrap();
        }

        assert_eq!(waitlist.promote_next().unwrap().user_id, users[0]);
        assert_eq!(waitlist.promote_next().unwrap().user_id, users[1]);
        assert_eq!(waitlist.promote_next().unwrap().user_id, users[2]);
        assert!(waitlist.promote_next().is_none());
    }

    #[test]
    fn test_leave_keeps_positions_stable() {
        let mut waitlist = Waitlist::new(Uuid::new_v4());
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        assert_eq!(waitlist.enqueue(a, Uuid::new_v4(), now).unwrap(), 1);
        assert_eq!(waitlist.enqueue(b, Uuid::new_v4(), now).unwrap(), 2);
        assert_eq!(waitlist.enqueue(c, Uuid::new_v4(), now).unwrap(), 3);

        waitlist.leave(&b).unwrap();
        assert_eq!(waitlist.position_of(&c), Some(3));
        assert_eq!(waitlist.len(), 2);

        // Positions are never reused
        let d = Uuid::new_v4();
        assert_eq!(waitlist.enqueue(d, Uuid::new_v4(), now).unwrap(), 4);
        assert_eq!(waitlist.promote_next().unwrap().user_id, a);
        assert_eq!(waitlist.promote_next().unwrap().user_id, c);
    }

    #[test]
    fn test_duplicate_and_missing() {
        let mut waitlist = Waitlist::new(Uuid::new_v4());
        let user = Uuid::new_v4();
        waitlist.enqueue(user, Uuid::new_v4(), Utc::now()).unwrap();

        assert!(matches!(
            waitlist.enqueue(user, Uuid::new_v4(), Utc::now()),
            Err(WaitlistError::AlreadyQueued(_))
        ));
        assert!(matches!(
            waitlist.leave(&Uuid::new_v4()),
            Err(WaitlistError::NotQueued(_))
        ));

        assert_eq!(waitlist.drain().len(), 1);
        assert!(waitlist.is_empty());
    }
}
