//! HTTP Request/Response Types

use fanout_core::QueueStats;
use serde::{Deserialize, Serialize};

/// Error body returned with every non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// GET /queues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueListResponse {
    pub queues: Vec<QueueStats>,
}
