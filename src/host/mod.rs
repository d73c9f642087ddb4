//! Host process manager: the seam between the coordinator and the OS.
//!
//! The coordinator never touches processes directly. It hands a [`WorkerLaunch`] to a
//! [`ProcessHost`], which creates the worker, assigns its [`WorkerId`] and reports
//! everything that happens to it as [`LifecycleSignal`]s on the channel it was given.
//!
//! ## Contents
//! - [`ProcessHost`] the spawn/terminate trait
//! - [`OsProcessHost`] real OS processes via `tokio::process`
//! - [`LifecycleSignal`] fork/online/message/exit notifications
//!
//! ## Per-worker signal order
//! ```text
//! Fork ──► Online ──► Message* ──► Exit { code, signal }
//! ```
//! Signals of different workers interleave freely.

mod process;
mod signal;

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::mpsc;

pub use process::OsProcessHost;
pub use signal::LifecycleSignal;

use crate::error::HostError;

/// Sending half of the ordered lifecycle channel.
pub type SignalSender = mpsc::UnboundedSender<LifecycleSignal>;

/// Receiving half of the ordered lifecycle channel.
pub type SignalReceiver = mpsc::UnboundedReceiver<LifecycleSignal>;

/// Opaque worker identity assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything a host needs to start one worker.
///
/// `env` is a snapshot taken for this spawn only; later queue movement cannot change it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLaunch {
    /// Job identifier the worker will run.
    pub job: String,
    /// Arguments passed to the worker program.
    pub args: Vec<String>,
    /// Full worker environment: base variables plus the reserved job key.
    pub env: BTreeMap<String, String>,
    /// Discard the worker's human-readable output.
    pub silent: bool,
}

/// Creates and tears down worker processes.
///
/// Implementations must deliver, for every worker they return an id for, a `Fork`,
/// an `Online` and exactly one final `Exit` on `signals`, in that order.
pub trait ProcessHost: Send {
    /// Starts one worker and returns its id.
    ///
    /// `signals` is where the worker's lifecycle signals and control messages go.
    fn spawn(&mut self, launch: WorkerLaunch, signals: SignalSender)
    -> Result<WorkerId, HostError>;

    /// Asks every live worker to stop. Their `Exit` signals still arrive as usual.
    fn terminate_all(&mut self);
}
