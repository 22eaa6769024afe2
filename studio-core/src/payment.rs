use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Approved,
    Declined,
    Pending,
}

/// Result of a card authorization performed by the caller for a drop-in
/// booking. The engine only checks that it was approved and keeps the amount
/// for co-op settlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentAuthorization {
    pub reference: String, // Provider's ID (e.g., pi_123)
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub authorized_at: DateTime<Utc>,
}

impl PaymentAuthorization {
    pub fn approved(reference: impl Into<String>, amount_cents: i64) -> Self {
        Self {
            reference: reference.into(),
            amount_cents,
            currency: "USD".to_string(),
            status: PaymentStatus::Approved,
            authorized_at: Utc::now(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == PaymentStatus::Approved && self.amount_cents >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_approved_authorizations_count() {
        let mut auth = PaymentAuthorization::approved("pi_123", 2500);
        assert!(auth.is_approved());

        auth.status = PaymentStatus::Pending;
        assert!(!auth.is_approved());

        let negative = PaymentAuthorization::approved("pi_neg", -1);
        assert!(!negative.is_approved());
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_value(PaymentAuthorization::approved("pi_9", 100)).unwrap();
        assert_eq!(json["status"], "APPROVED");
        assert_eq!(json["amount_cents"], 100);
    }
}
