use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// A user's place in line for a full class session.
///
/// `position` is the insertion sequence number for the session. It is a sort
/// key, not an index: leaving the line does not renumber anyone else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitlistEntry {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub booking_id: Uuid,
    pub position: u64,
    pub joined_at: DateTime<Utc>,
}
