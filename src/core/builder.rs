use std::sync::Arc;

use crate::config::ClusterConfig;
use crate::host::ProcessHost;
use crate::subscribers::Subscribe;

use super::coordinator::Coordinator;

/// Builder for a [`Coordinator`] with optional subscribers.
pub struct CoordinatorBuilder {
    cfg: ClusterConfig,
    host: Box<dyn ProcessHost>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl CoordinatorBuilder {
    pub(crate) fn new(cfg: ClusterConfig, host: Box<dyn ProcessHost>) -> Self {
        Self {
            cfg,
            host,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive coordinator events (spawns, exits, control messages)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the coordinator. Nothing is spawned until [`Coordinator::start`].
    pub fn build(self) -> Coordinator {
        Coordinator::new_internal(self.cfg, self.host, self.subscribers)
    }
}
