use crate::models::Booking;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

const BPS_SCALE: i128 = 10_000;

/// Revenue terms between the studio and a renting teacher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum RentalTier {
    /// Teacher pays a fixed rent on a separate cadence and keeps every booking's revenue.
    /// `fee_cents` is informational here; rent is billed outside booking settlement.
    FlatFee { fee_cents: i64 },
    /// Studio keeps `studio_bps` basis points of each booking, never less
    /// than `minimum_guarantee_cents` (capped at the amount paid)
    Percentage {
        studio_bps: u32,
        minimum_guarantee_cents: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RentalAgreement {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub tier: RentalTier,
    pub effective_from: NaiveDate,
    /// Open-ended when `None`
    pub effective_until: Option<NaiveDate>,
}

impl RentalAgreement {
    pub fn new(teacher_id: Uuid, tier: RentalTier, effective_from: NaiveDate, effective_until: Option<NaiveDate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            teacher_id,
            tier,
            effective_from,
            effective_until,
        }
    }

    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_until.map_or(true, |until| date <= until)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settlement {
    pub booking_id: Uuid,
    pub agreement_id: Uuid,
    pub amount_paid_cents: i64,
    pub studio_share_cents: i64,
    pub teacher_share_cents: i64,
}

/// `amount * bps / 10000`, rounded half up to the cent
fn percentage_of(amount_cents: i64, bps: u32) -> i64 {
    let scaled = i128::from(amount_cents) * i128::from(bps);
    ((scaled + BPS_SCALE / 2) / BPS_SCALE) as i64
}

/// Split what was paid for a co-op booking between studio and teacher.
///
/// The two shares always sum to `amount_paid_cents` exactly.
pub fn settle(
    booking: &Booking,
    agreement: &RentalAgreement,
    amount_paid_cents: i64,
) -> Result<Settlement, SettlementError> {
    if amount_paid_cents < 0 {
        return Err(SettlementError::InvalidAmount(amount_paid_cents));
    }

    let studio_share_cents = match &agreement.tier {
        RentalTier::FlatFee { .. } => 0,
        RentalTier::Percentage {
            studio_bps,
            minimum_guarantee_cents,
        } => {
            if i128::from(*studio_bps) > BPS_SCALE || *minimum_guarantee_cents < 0 {
                return Err(SettlementError::InvalidTier(agreement.id.to_string()));
            }
            percentage_of(amount_paid_cents, *studio_bps)
                .max(*minimum_guarantee_cents)
                .min(amount_paid_cents)
        }
    };
    let teacher_share_cents = amount_paid_cents - studio_share_cents;

    if studio_share_cents < 0
        || teacher_share_cents < 0
        || studio_share_cents + teacher_share_cents != amount_paid_cents
    {
        tracing::error!(
            booking_id = %booking.id,
            amount_paid_cents,
            studio_share_cents,
            teacher_share_cents,
            "Settlement shares do not sum to amount paid, operator attention required"
        );
        return Err(SettlementError::ShareMismatch {
            amount_paid_cents,
            studio_share_cents,
            teacher_share_cents,
        });
    }

    Ok(Settlement {
        booking_id: booking.id,
        agreement_id: agreement.id,
        amount_paid_cents,
        studio_share_cents,
        teacher_share_cents,
    })
}

/// Rental agreements by teacher
#[derive(Default)]
pub struct AgreementRegistry {
    by_teacher: RwLock<HashMap<Uuid, Vec<RentalAgreement>>>,
}

impl AgreementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agreement: RentalAgreement) {
        self.by_teacher
            .write()
            .entry(agreement.teacher_id)
            .or_default()
            .push(agreement);
    }

    /// Most recently started agreement effective on `date`
    pub fn effective_for(&self, teacher_id: &Uuid, date: NaiveDate) -> Option<RentalAgreement> {
        self.by_teacher
            .read()
            .get(teacher_id)?
            .iter()
            .filter(|a| a.is_effective_on(date))
            .max_by_key(|a| a.effective_from)
            .cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("Invalid amount paid: {0}")]
    InvalidAmount(i64),

    #[error("Invalid rental tier on agreement {0}")]
    InvalidTier(String),

    #[error("Shares {studio_share_cents} + {teacher_share_cents} do not sum to {amount_paid_cents}")]
    ShareMismatch {
        amount_paid_cents: i64,
        studio_share_cents: i64,
        teacher_share_cents: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, CreditSource};
    use chrono::Utc;
    use proptest::prelude::*;

    fn booking() -> Booking {
        Booking::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            CreditSource::membership(Uuid::new_v4()),
            BookingStatus::CheckedIn,
            Utc::now(),
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn percentage(studio_bps: u32, minimum_guarantee_cents: i64) -> RentalAgreement {
        RentalAgreement::new(
            Uuid::new_v4(),
            RentalTier::Percentage { studio_bps, minimum_guarantee_cents },
            date(2024, 1, 1),
            None,
        )
    }

    #[test]
    fn test_percentage_split() {
        let settlement = settle(&booking(), &percentage(7000, 0), 2000).unwrap();
        assert_eq!(settlement.studio_share_cents, 1400);
        assert_eq!(settlement.teacher_share_cents, 600);
    }

    #[test]
    fn test_round_half_up() {
        // 33.33% of $0.15 = 4.9995 cents -> 5
        let settlement = settle(&booking(), &percentage(3333, 0), 15).unwrap();
        assert_eq!(settlement.studio_share_cents, 5);
        assert_eq!(settlement.teacher_share_cents, 10);

        // exactly half a cent rounds up: 50% of 1 cent
        let settlement = settle(&booking(), &percentage(5000, 0), 1).unwrap();
        assert_eq!(settlement.studio_share_cents, 1);
        assert_eq!(settlement.teacher_share_cents, 0);
    }

    #[test]
    fn test_flat_fee_goes_to_teacher() {
        let agreement = RentalAgreement::new(
            Uuid::new_v4(),
            RentalTier::FlatFee { fee_cents: 15000 },
            date(2024, 1, 1),
            None,
        );
        let settlement = settle(&booking(), &agreement, 2500).unwrap();
        assert_eq!(settlement.studio_share_cents, 0);
        assert_eq!(settlement.teacher_share_cents, 2500);
    }

    #[test]
    fn test_minimum_guarantee_capped_at_amount() {
        let settlement = settle(&booking(), &percentage(1000, 500), 2000).unwrap();
        assert_eq!(settlement.studio_share_cents, 500);
        assert_eq!(settlement.teacher_share_cents, 1500);

        let settlement = settle(&booking(), &percentage(1000, 500), 300).unwrap();
        assert_eq!(settlement.studio_share_cents, 300);
        assert_eq!(settlement.teacher_share_cents, 0);
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(
            settle(&booking(), &percentage(7000, 0), -1),
            Err(SettlementError::InvalidAmount(-1))
        );
        assert!(matches!(
            settle(&booking(), &percentage(10_001, 0), 100),
            Err(SettlementError::InvalidTier(_))
        ));
    }

    #[test]
    fn test_registry_picks_effective_agreement() {
        let registry = AgreementRegistry::new();
        let teacher = Uuid::new_v4();
        let old = RentalAgreement::new(
            teacher,
            RentalTier::FlatFee { fee_cents: 10000 },
            date(2024, 1, 1),
            Some(date(2024, 6, 30)),
        );
        let current = RentalAgreement::new(
            teacher,
            RentalTier::Percentage { studio_bps: 6000, minimum_guarantee_cents: 0 },
            date(2024, 7, 1),
            None,
        );
        registry.register(old.clone());
        registry.register(current.clone());

        assert_eq!(registry.effective_for(&teacher, date(2024, 3, 1)), Some(old));
        assert_eq!(registry.effective_for(&teacher, date(2025, 3, 1)), Some(current));
        assert_eq!(registry.effective_for(&teacher, date(2023, 3, 1)), None);
        assert_eq!(registry.effective_for(&Uuid::new_v4(), date(2025, 3, 1)), None);
    }

    proptest! {
        #[test]
        fn shares_always_sum_to_amount(
            amount in 0i64..10_000_000,
            bps in 0u32..=10_000,
            minimum in 0i64..5_000,
        ) {
            let settlement = settle(&booking(), &percentage(bps, minimum), amount).unwrap();
            prop_assert_eq!(settlement.studio_share_cents + settlement.teacher_share_cents, amount);
            prop_assert!(settlement.studio_share_cents >= 0);
            prop_assert!(settlement.teacher_share_cents >= 0);
        }
    }
}
