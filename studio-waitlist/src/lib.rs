pub mod models;
pub mod queue;
pub mod expiry;

pub use models::WaitlistEntry;
pub use queue::{Waitlist, WaitlistError};
pub use expiry::HoldPolicy;
