// Domain Layer - Plain data carried through the queue engine

pub mod message;
pub mod queue;

// Re-exports
pub use message::Message;
pub use queue::{QueueConfig, QueueId, QueueStats, SubscriberId};
