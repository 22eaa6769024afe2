pub mod error;
pub mod manager;
pub mod models;
pub mod policy;
pub mod settlement;
pub mod store;
pub mod sweep;

pub use error::{BookingError, ErrorClass};
pub use manager::BookingManager;
pub use models::{Actor, Booking, BookingStatus, CreditSource};
pub use policy::{BookingPolicy, CancellationOutcome, CancellationPolicy};
pub use settlement::{settle, AgreementRegistry, RentalAgreement, RentalTier, Settlement, SettlementError};
pub use store::BookingStore;
pub use sweep::SweepReport;
