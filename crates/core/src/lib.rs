// Fanout Core - Queue Engine & Broker Registry
// NO transport dependencies: HTTP, config files and process wiring live in outer crates

pub mod application;
pub mod domain;
pub mod error;

pub use application::{shutdown_channel, Broker, Queue, ShutdownSender, ShutdownToken, Subscription};
pub use domain::{Message, QueueConfig, QueueStats, SubscriberId};
pub use error::{BrokerError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
