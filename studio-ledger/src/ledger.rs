use crate::membership::{Membership, MembershipStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use studio_core::{KeyedLocks, LockError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    BookingDebit,
    CancelRefund,
    LateCancelForfeit,
    NoShowForfeit,
    ManualAdjustment,
}

impl LedgerReason {
    pub fn is_forfeit(&self) -> bool {
        matches!(self, LedgerReason::LateCancelForfeit | LedgerReason::NoShowForfeit)
    }
}

/// Immutable ledger line. `balance_after` is the running sum of all deltas
/// up to and including this entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub membership_id: Uuid,
    pub delta: i64,
    pub reason: LedgerReason,
    pub booking_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub balance_after: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Balance {
    Unlimited,
    Credits(i64),
}

/// One membership's ledger plus its cached balance
#[derive(Debug)]
struct Account {
    membership: Membership,
    entries: Vec<LedgerEntry>,
    applied: HashSet<(Uuid, LedgerReason)>,
}

impl Account {
    fn new(mut membership: Membership) -> Self {
        if !membership.is_unlimited() {
            membership.credits_remaining = Some(0);
        }
        Self {
            membership,
            entries: Vec::new(),
            applied: HashSet::new(),
        }
    }

    fn cached(&self) -> i64 {
        self.membership.credits_remaining.unwrap_or(0)
    }

    fn balance(&self) -> Balance {
        match self.membership.credits_remaining {
            Some(credits) if !self.membership.is_unlimited() => Balance::Credits(credits),
            _ => Balance::Unlimited,
        }
    }

    fn fold(&self) -> i64 {
        self.entries.iter().map(|e| e.delta).sum()
    }

    /// Cached balance must equal the last snapshot
    fn check_snapshot(&self) -> Result<(), LedgerError> {
        let snapshot = self.entries.last().map_or(0, |e| e.balance_after);
        if snapshot != self.cached() {
            return Err(self.mismatch(snapshot));
        }
        Ok(())
    }

    /// Full fold check: cached balance, last snapshot and sum of deltas agree
    fn verify(&self) -> Result<Balance, LedgerError> {
        self.check_snapshot()?;
        let derived = self.fold();
        if derived != self.cached() {
            return Err(self.mismatch(derived));
        }
        Ok(self.balance())
    }

    fn mismatch(&self, derived: i64) -> LedgerError {
        error!(
            membership_id = %self.membership.id,
            cached = self.cached(),
            derived,
            "Ledger balance mismatch, operator attention required"
        );
        LedgerError::BalanceMismatch {
            membership_id: self.membership.id,
            cached: self.cached(),
            derived,
        }
    }

    fn debited_for(&self, booking_id: &Uuid) -> i64 {
        -self
            .entries
            .iter()
            .filter(|e| e.booking_id == Some(*booking_id) && e.reason == LedgerReason::BookingDebit)
            .map(|e| e.delta)
            .sum::<i64>()
    }

    /// Append one entry and move the cached balance with it.
    fn append(
        &mut self,
        delta: i64,
        reason: LedgerReason,
        booking_id: Option<Uuid>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Balance, LedgerError> {
        self.check_snapshot()?;

        let balance_after = self.cached() + delta;
        if !self.membership.is_unlimited() && balance_after < 0 {
            return Err(LedgerError::InsufficientCredits {
                membership_id: self.membership.id,
                available: self.cached(),
                required: -delta,
            });
        }

        self.entries.push(LedgerEntry {
            id: Uuid::new_v4(),
            membership_id: self.membership.id,
            delta,
            reason,
            booking_id,
            note,
            created_at: now,
            balance_after,
        });
        if !self.membership.is_unlimited() {
            self.membership.credits_remaining = Some(balance_after);
        }
        if let Some(booking_id) = booking_id {
            self.applied.insert((booking_id, reason));
        }
        Ok(self.balance())
    }
}

/// Exclusive hold on one membership's ledger. Released on drop.
pub struct AccountHold {
    account: OwnedMutexGuard<Account>,
}

impl AccountHold {
    pub fn balance(&self) -> Balance {
        self.account.balance()
    }
}

/// Append-only credit ledger, serialized per membership.
pub struct CreditLedger {
    accounts: KeyedLocks<Account>,
}

impl CreditLedger {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            accounts: KeyedLocks::new("membership", lock_timeout),
        }
    }

    /// Register a membership. A credit pack's starting credits are written as
    /// an opening adjustment so the balance is always the sum of the ledger.
    pub fn open(&self, membership: Membership, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let id = membership.id;
        let opening = membership.credits_remaining.unwrap_or(0);
        if !membership.is_unlimited() && opening < 0 {
            return Err(LedgerError::InvalidAdjustment(format!(
                "opening balance {} for {}",
                opening, id
            )));
        }

        let mut account = Account::new(membership);
        if !account.membership.is_unlimited() && opening > 0 {
            account.append(
                opening,
                LedgerReason::ManualAdjustment,
                None,
                Some("opening balance".to_string()),
                now,
            )?;
        }

        if !self.accounts.insert(id, account) {
            return Err(LedgerError::AlreadyExists(id.to_string()));
        }
        info!(membership_id = %id, opening, "Membership opened");
        Ok(())
    }

    /// Consume credits for a booking.
    ///
    /// Unlimited memberships always succeed while usable and record a
    /// zero-delta entry. Re-debiting the same booking is a no-op.
    pub async fn debit(
        &self,
        membership_id: &Uuid,
        booking_id: &Uuid,
        credits: u32,
        now: DateTime<Utc>,
    ) -> Result<Balance, LedgerError> {
        let mut account = self.accounts.lock(membership_id).await?;

        if account.applied.contains(&(*booking_id, LedgerReason::BookingDebit)) {
            debug!(membership_id = %membership_id, booking_id = %booking_id, "Debit already applied");
            return Ok(account.balance());
        }
        if !account.membership.is_usable_at(now) {
            return Err(LedgerError::MembershipExpired(membership_id.to_string()));
        }

        let delta = if account.membership.is_unlimited() {
            0
        } else {
            -i64::from(credits.max(1))
        };
        let balance = account.append(delta, LedgerReason::BookingDebit, Some(*booking_id), None, now)?;
        debug!(membership_id = %membership_id, booking_id = %booking_id, delta, "Credits debited");
        Ok(balance)
    }

    /// Refund whatever was debited for `booking_id`.
    ///
    /// Idempotent per (booking, reason): a repeated call returns the current
    /// balance without writing a second entry.
    pub async fn credit(
        &self,
        membership_id: &Uuid,
        booking_id: &Uuid,
        reason: LedgerReason,
        now: DateTime<Utc>,
    ) -> Result<Balance, LedgerError> {
        if reason == LedgerReason::BookingDebit || reason.is_forfeit() {
            return Err(LedgerError::InvalidReason(reason));
        }

        let mut account = self.accounts.lock(membership_id).await?;
        if account.applied.contains(&(*booking_id, reason)) {
            debug!(membership_id = %membership_id, booking_id = %booking_id, ?reason, "Credit already applied");
            return Ok(account.balance());
        }

        let refund = account.debited_for(booking_id);
        if !account.membership.is_unlimited() && refund == 0 {
            return Err(LedgerError::NothingToRefund(booking_id.to_string()));
        }
        let balance = account.append(refund, reason, Some(*booking_id), None, now)?;
        debug!(membership_id = %membership_id, booking_id = %booking_id, refund, "Credits refunded");
        Ok(balance)
    }

    /// Zero-delta audit entry confirming the debit was kept (late cancel,
    /// no-show). Idempotent like `credit`.
    pub async fn record_forfeit(
        &self,
        membership_id: &Uuid,
        booking_id: &Uuid,
        reason: LedgerReason,
        now: DateTime<Utc>,
    ) -> Result<Balance, LedgerError> {
        if !reason.is_forfeit() {
            return Err(LedgerError::InvalidReason(reason));
        }

        let mut account = self.accounts.lock(membership_id).await?;
        if account.applied.contains(&(*booking_id, reason)) {
            return Ok(account.balance());
        }
        account.append(0, reason, Some(*booking_id), None, now)
    }

    /// Staff correction on a credit pack
    pub async fn adjust(
        &self,
        membership_id: &Uuid,
        delta: i64,
        note: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Balance, LedgerError> {
        let mut account = self.accounts.lock(membership_id).await?;
        if account.membership.is_unlimited() || delta == 0 {
            return Err(LedgerError::InvalidAdjustment(format!(
                "delta {} on {}",
                delta, membership_id
            )));
        }
        let balance = account.append(delta, LedgerReason::ManualAdjustment, None, Some(note.into()), now)?;
        info!(membership_id = %membership_id, delta, "Manual ledger adjustment");
        Ok(balance)
    }

    pub async fn set_status(&self, membership_id: &Uuid, status: MembershipStatus) -> Result<(), LedgerError> {
        self.accounts.lock(membership_id).await?.membership.status = status;
        Ok(())
    }

    pub async fn balance(&self, membership_id: &Uuid) -> Result<Balance, LedgerError> {
        Ok(self.accounts.lock(membership_id).await?.balance())
    }

    pub async fn membership(&self, membership_id: &Uuid) -> Result<Membership, LedgerError> {
        Ok(self.accounts.lock(membership_id).await?.membership.clone())
    }

    pub async fn history(&self, membership_id: &Uuid) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.accounts.lock(membership_id).await?.entries.clone())
    }

    /// Freeze a membership while staff reconcile it against an outside
    /// record. Every other operation on it waits and fails `Busy` once the
    /// lock timeout passes.
    pub async fn hold(&self, membership_id: &Uuid) -> Result<AccountHold, LedgerError> {
        let account = self.accounts.lock(membership_id).await?;
        info!(membership_id = %membership_id, "Membership held for reconciliation");
        Ok(AccountHold { account })
    }

    /// Recompute the fold and compare it with the cached balance
    pub async fn verify(&self, membership_id: &Uuid) -> Result<Balance, LedgerError> {
        self.accounts.lock(membership_id).await?.verify()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Membership not found: {0}")]
    NotFound(String),

    #[error("Membership busy: {0}")]
    Busy(String),

    #[error("Membership already open: {0}")]
    AlreadyExists(String),

    #[error("Insufficient credits on {membership_id}: available {available}, required {required}")]
    InsufficientCredits {
        membership_id: Uuid,
        available: i64,
        required: i64,
    },

    #[error("Membership expired or inactive: {0}")]
    MembershipExpired(String),

    #[error("No debit to refund for booking {0}")]
    NothingToRefund(String),

    #[error("Reason {0:?} not valid for this operation")]
    InvalidReason(LedgerReason),

    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(String),

    #[error("Balance mismatch on {membership_id}: cached {cached}, derived {derived}")]
    BalanceMismatch {
        membership_id: Uuid,
        cached: i64,
        derived: i64,
    },
}

impl From<LockError> for LedgerError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::NotFound { key, .. } => LedgerError::NotFound(key.to_string()),
            LockError::Busy { key, .. } => LedgerError::Busy(key.to_string()),
        }
    }
}
