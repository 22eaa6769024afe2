use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipKind {
    Unlimited,
    CreditPack,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Expired,
    Cancelled,
}

/// A user's right to book classes.
///
/// `credits_remaining` is `None` for unlimited memberships; they never
/// decrement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: MembershipKind,
    pub credits_remaining: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub status: MembershipStatus,
}

impl Membership {
    pub fn unlimited(owner_id: Uuid, valid_from: DateTime<Utc>, valid_until: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind: MembershipKind::Unlimited,
            credits_remaining: None,
            valid_from,
            valid_until,
            status: MembershipStatus::Active,
        }
    }

    pub fn credit_pack(
        owner_id: Uuid,
        credits: i64,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind: MembershipKind::CreditPack,
            credits_remaining: Some(credits),
            valid_from,
            valid_until,
            status: MembershipStatus::Active,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.kind == MembershipKind::Unlimited
    }

    /// Active and inside its validity window
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MembershipStatus::Active && self.valid_from <= now && now <= self.valid_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let mut membership = Membership::credit_pack(Uuid::new_v4(), 5, now, now + Duration::days(30));

        assert!(membership.is_usable_at(now));
        assert!(membership.is_usable_at(now + Duration::days(30)));
        assert!(!membership.is_usable_at(now - Duration::seconds(1)));
        assert!(!membership.is_usable_at(now + Duration::days(31)));

        membership.status = MembershipStatus::Cancelled;
        assert!(!membership.is_usable_at(now));
    }
}
