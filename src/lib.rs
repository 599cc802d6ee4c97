pub mod config;
pub mod correlation;
pub mod env;
pub mod error;
pub mod logger;
pub mod record;
pub mod request;
pub mod severity;
pub mod sink;

#[cfg(feature = "cloud")]
pub mod cloud;

pub mod init;
pub mod memory_sink;
pub mod noop_sink;
pub mod notifier;
pub mod relay;
pub mod slack;
pub mod stdout_sink;

pub use config::LoggerConfig;
pub use correlation::{CorrelationContext, HeaderSource};
pub use error::{DeliveryError, Error, RelayError};
pub use logger::Logger;
pub use request::RequestLogger;
pub use severity::Severity;
