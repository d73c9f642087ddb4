//! # Worker-side runtime.
//!
//! A worker is the same or another binary launched by the coordinator with two reserved
//! environment keys: [`JOB_ENV`] (the job identifier) and [`WORKER_ID_ENV`]. Inside it,
//! [`start_job`] reads them, runs the job body once and turns the outcome into the process
//! exit code the coordinator classifies.
//!
//! ```text
//! coordinator ── env {CLUSTERVISOR_JOB, CLUSTERVISOR_WORKER_ID} ──► worker
//! worker      ── stdout: {"action":"...","message":"..."}\n     ──► coordinator
//! worker      ── exit code (0 clean, else crash)                ──► coordinator
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use clustervisor::worker::{self, WorkerContext};
//! use clustervisor::{Action, ControlMessage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     if !worker::is_worker() {
//!         return std::process::ExitCode::FAILURE;
//!     }
//!     worker::start_job(|ctx: Arc<WorkerContext>| async move {
//!         let note = ControlMessage::action(Action::CheckQueue).with_message(ctx.job());
//!         ctx.send(&note).await?;
//!         Ok::<_, clustervisor::WorkerError>(())
//!     })
//!     .await
//! }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::error;

use crate::error::WorkerError;
use crate::host::WorkerId;
use crate::protocol::{Action, ControlMessage};

/// Environment key carrying the job identifier.
pub const JOB_ENV: &str = "CLUSTERVISOR_JOB";

/// Environment key carrying the worker id assigned by the host.
pub const WORKER_ID_ENV: &str = "CLUSTERVISOR_WORKER_ID";

/// True if this process was launched by a coordinator.
pub fn is_worker() -> bool {
    std::env::var_os(JOB_ENV).is_some()
}

/// What a worker knows about itself, plus its control channel.
#[derive(Debug)]
pub struct WorkerContext<W = Stdout> {
    id: WorkerId,
    job: String,
    out: Mutex<W>,
}

impl WorkerContext<Stdout> {
    /// Reads the reserved keys from the process environment; messages go to stdout.
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| std::env::var(key).ok(), tokio::io::stdout())
    }
}

impl<W> WorkerContext<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Builds a context from any key lookup and writer.
    pub fn from_lookup<F>(lookup: F, out: W) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let job = lookup(JOB_ENV).ok_or(WorkerError::MissingEnv(JOB_ENV))?;
        let raw = lookup(WORKER_ID_ENV).ok_or(WorkerError::MissingEnv(WORKER_ID_ENV))?;
        let id = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| WorkerError::InvalidId(raw.clone()))?;
        Ok(Self {
            id: WorkerId::new(id),
            job,
            out: Mutex::new(out),
        })
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Job identifier this worker was launched for.
    #[inline]
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Writes one control message line and flushes it.
    pub async fn send(&self, message: &ControlMessage) -> Result<(), WorkerError> {
        let line = message.encode()?;
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }

    #[cfg(test)]
    fn into_writer(self) -> W {
        self.out.into_inner()
    }
}

/// Runs the job body for this worker and returns the exit code to finish with.
///
/// A missing or malformed environment fails without running `body`. A failing body
/// reports an `unhandled-exception` message with the error text before returning failure.
pub async fn start_job<F, Fut, E>(body: F) -> ExitCode
where
    F: FnOnce(Arc<WorkerContext>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    match WorkerContext::from_env() {
        Ok(ctx) => run_job(Arc::new(ctx), body).await,
        Err(e) => {
            error!(error = %e, "not started by a coordinator");
            ExitCode::FAILURE
        }
    }
}

async fn run_job<W, F, Fut, E>(ctx: Arc<WorkerContext<W>>, body: F) -> ExitCode
where
    W: AsyncWrite + Unpin + Send,
    F: FnOnce(Arc<WorkerContext<W>>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    match body(Arc::clone(&ctx)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let text = e.to_string();
            error!(worker = %ctx.id(), job = ctx.job(), error = %text, "job failed");
            let report = ControlMessage::action(Action::UnhandledException).with_message(text);
            if let Err(send_err) = ctx.send(&report).await {
                error!(error = %send_err, "cannot report job failure");
            }
            ExitCode::FAILURE
        }
    }
}
