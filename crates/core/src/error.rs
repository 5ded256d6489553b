// Central Error Type for the Broker

use thiserror::Error;

/// Broker-level error type
///
/// Every variant is returned synchronously to the immediate caller and leaves
/// queue state unchanged. None of them is fatal to a queue or to the broker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("queue full: {0}")]
    QueueFull(String),

    #[error("too many subscribers: {0}")]
    TooManySubscribers(String),

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("queue closed: {0}")]
    QueueClosed(String),
}

/// Result type alias using BrokerError
pub type Result<T> = std::result::Result<T, BrokerError>;
