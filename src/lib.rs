//! # clustervisor
//!
//! **Clustervisor** runs a list of jobs as separate OS worker processes under a
//! concurrency limit, replaces workers that exit or crash, and optionally cycles the
//! job list forever.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ClusterConfig { QUEUE, WORKER_LIMIT, ARGS, ENV_VARIABLES, SILENT_MODE, LOOP }
//!            │
//!            ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Coordinator (single sequencing loop)                            │
//! │  - Supervisor: JobQueue + running set + capacity gate            │
//! │  - Router: Fork / Online / Message / Exit ─► supervisor actions  │
//! │  - Bus (broadcast events) ─► SubscriberSet ─► LogWriter, ...     │
//! └──────┬───────────────────────────────────────────────▲───────────┘
//!        │ spawn(WorkerLaunch)                           │ LifecycleSignal (mpsc)
//!        ▼                                               │
//! ┌──────────────────────────────────────────────────────┴───────────┐
//! │  ProcessHost (OsProcessHost: tokio::process)                     │
//! └──────┬──────────────────┬──────────────────┬─────────────────────┘
//!        ▼                  ▼                  ▼
//!   worker #1          worker #2          worker #N
//!   env CLUSTERVISOR_JOB=j3, stdout = NDJSON control messages
//! ```
//!
//! ### Lifecycle
//! ```text
//! start()
//!   ├─► pre-start hook (optional)
//!   ├─► spawn until running == limit or queue drained
//!   └─► loop {
//!         Exit { worker, code, signal }
//!           ├─► release(worker)
//!           ├─► clean (code 0) or crashed (logged, never fatal)
//!           └─► try_spawn()  ─► next job, or nothing if drained
//!         stop when drained and running == 0 (never when looping)
//!       }
//! ```
//!
//! ## Features
//! | Area              | Description                                             | Key types / traits                       |
//! |-------------------|---------------------------------------------------------|------------------------------------------|
//! | **Coordination**  | Bounded spawning, respawn on exit, graceful shutdown.   | [`Coordinator`], [`ClusterConfig`]       |
//! | **Hosts**         | Where workers run.                                      | [`ProcessHost`], [`OsProcessHost`]       |
//! | **Protocol**      | Worker to coordinator control messages.                 | [`ControlMessage`], [`Action`]           |
//! | **Subscriber API**| Observe coordinator events.                             | [`Subscribe`], [`LogWriter`]             |
//! | **Errors**        | Typed errors and the top-level fault classifier.        | [`RuntimeError`], [`Fault`]              |
//! | **Workers**       | Job-side runtime for the spawned processes.             | [`worker::start_job`]                    |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use clustervisor::{ClusterConfig, Coordinator, LogWriter, OsProcessHost, Subscribe};
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     clustervisor::logging::init(Default::default());
//!
//!     let cfg = match ClusterConfig::from_file("cluster.json") {
//!         Ok(cfg) => cfg,
//!         Err(e) => {
//!             clustervisor::fault::handle(&e.into());
//!             return std::process::ExitCode::FAILURE;
//!         }
//!     };
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     Coordinator::builder(cfg, OsProcessHost::new("./worker"))
//!         .with_subscribers(subs)
//!         .build()
//!         .start_or_exit()
//!         .await
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod hook;
mod host;
mod protocol;
mod queue;
mod subscribers;

pub mod fault;
pub mod logging;
pub mod worker;

// ---- Public re-exports ----

pub use config::{ClusterConfig, ClusterFile, clamp_worker_limit};
pub use core::{Coordinator, CoordinatorBuilder, CoordinatorReport};
pub use error::{ConfigError, HostError, ProtocolError, RuntimeError, WorkerError};
pub use events::{Event, EventKind};
pub use fault::{Fault, FaultPayload};
pub use hook::{HookFn, PreStart, PreStartRef};
pub use host::{LifecycleSignal, OsProcessHost, ProcessHost, SignalSender, WorkerId, WorkerLaunch};
pub use protocol::{Action, ControlMessage};
pub use queue::JobQueue;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
