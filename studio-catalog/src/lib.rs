pub mod session;
pub mod pricing;
pub mod capacity;

pub use session::{ClassSession, SessionStatus};
pub use pricing::CoopPricing;
pub use capacity::{CapacityError, CapacityTracker, Reservation, SeatCount, SeatSnapshot, SessionGuard, SessionSlot};
