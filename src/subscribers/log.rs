//! # Logging subscriber.
//!
//! [`LogWriter`] renders coordinator events through `tracing`, one line per event.
//!
//! ## Levels
//! ```text
//! info   spawned / online / exited / control message / drained / stopped
//! warn   crashed / spawn failed / shutdown requested
//! debug  forked / spawn rejected at capacity
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber writing every event to the active `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.map(|w| w.to_string()).unwrap_or_default();
        let job = e.job.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::WorkerSpawned => {
                info!(%worker, job, running = ?e.running, limit = ?e.limit, "[spawned]");
            }
            EventKind::WorkerForked => debug!(%worker, job, "[forked]"),
            EventKind::WorkerOnline => info!(%worker, job, "[online]"),
            EventKind::WorkerExited => info!(%worker, job, running = ?e.running, "[exited]"),
            EventKind::WorkerCrashed => warn!(
                %worker, job, code = ?e.code, signal = ?e.signal, running = ?e.running,
                "[crashed]"
            ),
            EventKind::SpawnRejected => {
                debug!(running = ?e.running, limit = ?e.limit, "[at-capacity]");
            }
            EventKind::SpawnFailed => warn!(
                job,
                running = ?e.running,
                error = e.reason.as_deref().unwrap_or("-"),
                "[spawn-failed]"
            ),
            EventKind::QueueDrained => info!("[queue-drained]"),
            EventKind::ControlReceived => info!(
                %worker,
                action = e.action.map(|a| a.as_str()).unwrap_or("-"),
                message = e.reason.as_deref().unwrap_or(""),
                "[control]"
            ),
            EventKind::ShutdownRequested => warn!("[shutdown-requested]"),
            EventKind::CoordinatorStopped => info!(running = ?e.running, "[stopped]"),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
