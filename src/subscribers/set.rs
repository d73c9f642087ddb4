//! # SubscriberSet: fan-out of coordinator events.
//!
//! [`SubscriberSet`] hands each [`Event`] to every subscriber's own bounded queue and
//! returns at once; a dedicated task per subscriber drains that queue.
//!
//! ```text
//!    emit(&Event)                     (one Arc per event)
//!        ├──► [queue "log"]     ─► task ─► on_event()
//!        ├──► [queue "metrics"] ─► task ─► on_event()
//!        └──► [queue ...]       ─► task ─► on_event()
//! ```
//!
//! ## Rules
//! - Per-subscriber FIFO; no ordering across subscribers.
//! - A full or closed queue drops the event for that subscriber only. The first drop is
//!   logged at `warn`, later ones at `debug`; [`SubscriberSet::shutdown`] returns the total.
//! - A panicking subscriber is logged and keeps receiving later events.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, warn};

use crate::events::Event;

use super::Subscribe;

struct Lane {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

impl Lane {
    fn record_drop(&self, reason: &'static str) {
        let before = self.dropped.fetch_add(1, Ordering::Relaxed);
        if before == 0 {
            warn!(subscriber = self.name, reason, "dropping events for subscriber");
        } else {
            debug!(subscriber = self.name, reason, dropped = before + 1, "event dropped");
        }
    }
}

/// Subscribers with their queues and worker tasks.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Spawns one worker task per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut lanes = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));

            workers.push(tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let delivery = std::panic::AssertUnwindSafe(sub.on_event(&ev)).catch_unwind();
                    if let Err(panic) = delivery.await {
                        error!(subscriber = name, seq = ev.seq, panic = ?panic, "subscriber panicked");
                    }
                }
            }));
            lanes.push(Lane {
                name,
                sender: tx,
                dropped: AtomicU64::new(0),
            });
        }

        Self { lanes, workers }
    }

    /// Queues `event` for every subscriber without waiting.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for lane in &self.lanes {
            match lane.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => lane.record_drop("queue full"),
                Err(mpsc::error::TrySendError::Closed(_)) => lane.record_drop("worker closed"),
            }
        }
    }

    /// Events dropped so far, over all subscribers.
    pub fn dropped(&self) -> u64 {
        self.lanes
            .iter()
            .map(|lane| lane.dropped.load(Ordering::Relaxed))
            .sum()
    }

    /// Closes every queue, waits for the workers to drain them and returns the drop total.
    pub async fn shutdown(self) -> u64 {
        let dropped = self.dropped();
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
        dropped
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::events::EventKind;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber bug");
        }
    }

    struct Slow;

    #[async_trait]
    impl Subscribe for Slow {
        async fn on_event(&self, _ev: &Event) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_survives_panics() {
        let rec = Arc::new(Recorder::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Panicker), rec.clone()];
        let set = SubscriberSet::new(subs);
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::WorkerSpawned));
        set.emit(&Event::new(EventKind::WorkerExited));
        assert_eq!(set.shutdown().await, 0);

        assert_eq!(
            *rec.0.lock().unwrap(),
            vec![EventKind::WorkerSpawned, EventKind::WorkerExited]
        );
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let set = SubscriberSet::new(vec![Arc::new(Slow) as Arc<dyn Subscribe>]);
        for _ in 0..5 {
            set.emit(&Event::new(EventKind::SpawnRejected));
        }
        assert_eq!(set.dropped(), 4);
        assert_eq!(set.shutdown().await, 4);
    }

    #[tokio::test]
    async fn empty_set_is_noop() {
        let set = SubscriberSet::new(Vec::new());
        assert!(set.is_empty());
        set.emit(&Event::new(EventKind::QueueDrained));
        assert_eq!(set.shutdown().await, 0);
    }
}
