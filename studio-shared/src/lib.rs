pub mod models;

pub use models::events::BookingEvent;
