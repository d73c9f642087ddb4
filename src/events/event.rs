//! # Events emitted by the coordinator.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Worker lifecycle**: spawned, forked, online, exited, crashed
//! - **Capacity and queue**: spawn rejected at capacity, spawn failed, queue drained
//! - **Coordinator**: control messages, shutdown, stop
//!
//! The [`Event`] struct carries the metadata that applies to its kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use clustervisor::{Event, EventKind, WorkerId};
//!
//! let ev = Event::new(EventKind::WorkerCrashed)
//!     .with_worker(WorkerId::new(4))
//!     .with_job("site-a")
//!     .with_exit(Some(1), None);
//!
//! assert_eq!(ev.kind, EventKind::WorkerCrashed);
//! assert_eq!(ev.job.as_deref(), Some("site-a"));
//! assert_eq!(ev.code, Some(1));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::host::WorkerId;
use crate::protocol::Action;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of coordinator events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Worker lifecycle ===
    /// Supervisor asked the host for a worker.
    ///
    /// Sets: `worker`, `job`, `running`, `limit`
    WorkerSpawned,

    /// Host confirmed the worker record.
    ///
    /// Sets: `worker`, `job`
    WorkerForked,

    /// Worker process is running.
    ///
    /// Sets: `worker`, `job`
    WorkerOnline,

    /// Worker exited with code 0.
    ///
    /// Sets: `worker`, `job`, `code`, `running`
    WorkerExited,

    /// Worker exited with a non-zero code or was killed by a signal.
    ///
    /// Sets: `worker`, `job`, `code`, `signal`, `running`
    WorkerCrashed,

    // === Capacity and queue ===
    /// Spawn skipped because `running == limit`.
    ///
    /// Sets: `running`, `limit`
    SpawnRejected,

    /// Host could not start a worker after an exit freed a slot. The job stays queued and
    /// the next exit retries it.
    ///
    /// Sets: `job`, `running`, `reason`
    SpawnFailed,

    /// Queue is empty and not looping; no more spawns will happen.
    QueueDrained,

    // === Coordinator ===
    /// A worker sent a control message.
    ///
    /// Sets: `worker`, `action` (if any), `reason` (message text, if any)
    ControlReceived,

    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    /// Coordinator finished: drained, or shut down.
    ///
    /// Sets: `running`
    CoordinatorStopped,
}

/// Coordinator event with optional metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    pub worker: Option<WorkerId>,
    pub job: Option<Arc<str>>,
    /// Exit code, if the worker exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    /// Running workers after the event was applied.
    pub running: Option<usize>,
    pub limit: Option<usize>,
    pub action: Option<Action>,
    /// Human-readable detail (control message text, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            job: None,
            code: None,
            signal: None,
            running: None,
            limit: None,
            action: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    #[inline]
    pub fn with_job(mut self, job: impl Into<Arc<str>>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Attaches an optional job name (no-op for `None`).
    #[inline]
    pub fn with_job_opt(self, job: Option<&str>) -> Self {
        match job {
            Some(job) => self.with_job(job),
            None => self,
        }
    }

    #[inline]
    pub fn with_exit(mut self, code: Option<i32>, signal: Option<i32>) -> Self {
        self.code = code;
        self.signal = signal;
        self
    }

    /// Attaches the running count and, optionally, the limit.
    #[inline]
    pub fn with_load(mut self, running: usize, limit: Option<usize>) -> Self {
        self.running = Some(running);
        self.limit = limit;
        self
    }

    #[inline]
    pub fn with_action(mut self, action: Option<Action>) -> Self {
        self.action = action;
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
