// Application Layer - Queue engine and broker registry

pub mod broker;
pub mod constants;
pub mod queue;
pub mod shutdown;

// Re-exports
pub use broker::Broker;
pub use queue::{Queue, Subscription};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
