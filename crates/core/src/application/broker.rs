// Broker - Static registry of named queues

use crate::application::queue::Queue;
use crate::domain::{QueueConfig, QueueId, QueueStats};
use crate::error::{BrokerError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Name-keyed registry of queues, built once from configuration
///
/// The mapping never changes after construction, so lookups need no lock.
/// Queues share the broker's lifetime: `close` (or dropping the last
/// reference to every queue) shuts them all down.
pub struct Broker {
    queues: HashMap<QueueId, Arc<Queue>>,
}

impl Broker {
    /// Create one queue per configuration entry
    ///
    /// Construction never fails. Duplicate names are a configuration error to
    /// be rejected before this point; if one slips through, the later entry
    /// replaces the earlier queue.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime (each queue spawns its
    /// broadcast task).
    pub fn new(configs: &[QueueConfig]) -> Self {
        let mut queues = HashMap::with_capacity(configs.len());

        for config in configs {
            let name = config.name.clone();
            if queues
                .insert(name.clone(), Arc::new(Queue::new(config.clone())))
                .is_some()
            {
                warn!(queue = %name, "Duplicate queue name in configuration, keeping the last entry");
            }
        }

        info!(queues = queues.len(), "Broker initialized");
        Self { queues }
    }

    /// Look up a queue by name
    pub fn get_queue(&self, name: &str) -> Result<Arc<Queue>> {
        self.queues
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))
    }

    /// Registered queue names, sorted
    pub fn queue_names(&self) -> Vec<QueueId> {
        let mut names: Vec<QueueId> = self.queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stats for every queue, sorted by name
    pub fn stats(&self) -> Vec<QueueStats> {
        let mut stats: Vec<QueueStats> = self.queues.values().map(|q| q.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Close every queue (idempotent)
    pub fn close(&self) {
        for queue in self.queues.values() {
            queue.close();
        }
        info!(queues = self.queues.len(), "Broker closed");
    }
}
