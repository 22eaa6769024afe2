pub mod membership;
pub mod ledger;

pub use membership::{Membership, MembershipKind, MembershipStatus};
pub use ledger::{AccountHold, Balance, CreditLedger, LedgerEntry, LedgerError, LedgerReason};
