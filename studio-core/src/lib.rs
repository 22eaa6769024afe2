pub mod clock;
pub mod locks;
pub mod notify;
pub mod payment;

pub use clock::{Clock, ManualClock, SystemClock};
pub use locks::{KeyedLocks, LockError};
pub use notify::{spawn_forwarder, NotificationDispatcher, Notifier};
pub use payment::{PaymentAuthorization, PaymentStatus};
