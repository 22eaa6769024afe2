pub mod app_config;
pub mod events;

pub use app_config::{BusinessRules, Config, KafkaConfig, WorkerConfig};
pub use events::LogDispatcher;
#[cfg(feature = "kafka")]
pub use events::KafkaDispatcher;
