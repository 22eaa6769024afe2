use serde::{Deserialize, Serialize};

/// Prices for a co-op class, in cents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoopPricing {
    /// Minimum a drop-in authorization must cover
    pub drop_in_price_cents: i64,
    pub member_price_cents: i64,
    pub credits_required: u32,
}

impl CoopPricing {
    pub fn new(drop_in_price_cents: i64, member_price_cents: i64, credits_required: u32) -> Self {
        Self {
            drop_in_price_cents,
            member_price_cents,
            // A member booking always costs at least one credit
            credits_required: credits_required.max(1),
        }
    }
}
