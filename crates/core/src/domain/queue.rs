// Queue Domain Model

use serde::{Deserialize, Serialize};

/// Queue identifier
pub type QueueId = String;

/// Subscriber handle identifier (unique per queue, never reused)
pub type SubscriberId = u64;

/// Queue configuration
///
/// Field names on the wire follow the configuration document:
/// `{"name": "...", "size": 10, "max_sub": 2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: QueueId,

    /// Maximum number of buffered, undelivered messages
    #[serde(rename = "size")]
    pub capacity: usize,

    /// Maximum number of simultaneously attached subscribers
    #[serde(rename = "max_sub")]
    pub max_subscribers: usize,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, capacity: usize, max_subscribers: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            max_subscribers,
        }
    }
}

/// Point-in-time view of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub name: QueueId,
    pub capacity: usize,
    pub max_subscribers: usize,
    pub buffered: usize,
    pub subscribers: usize,
    pub closed: bool,
}
