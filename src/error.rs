//! Error types used by the clustervisor coordinator, host and worker runtime.
//!
//! - [`RuntimeError`]: failures that escape [`Coordinator::start`](crate::Coordinator::start) and end the coordinator.
//! - [`ConfigError`]: configuration document could not be read or is invalid.
//! - [`HostError`]: the host process manager could not create a worker.
//! - [`ProtocolError`]: a control-message line could not be decoded or encoded.
//! - [`WorkerError`]: the worker-side runtime was started outside a coordinator.
//!
//! Every enum exposes `as_label()` with a short stable snake_case label for logs.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::fault::FaultPayload;

/// # Errors that terminate the coordinator.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The host could not create a worker for `job`.
    #[error("failed to spawn worker for job {job:?}: {source}")]
    Spawn {
        /// Job identifier the worker was meant to run.
        job: String,
        /// Underlying host failure.
        #[source]
        source: HostError,
    },

    /// The pre-start hook failed.
    #[error("pre-start hook failed: {0}")]
    Hook(FaultPayload),

    /// Shutdown grace period was exceeded; some workers did not exit in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck workers: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Ids of the workers still running.
        stuck: Vec<u64>,
    },

    /// OS signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use clustervisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config(e) => e.as_label(),
            RuntimeError::Spawn { .. } => "runtime_spawn_failed",
            RuntimeError::Hook(_) => "runtime_hook_failed",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal_setup",
        }
    }
}

/// # Configuration load failures (always fatal, before any worker exists).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File missing or unreadable.
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not a valid cluster document.
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Document parsed but holds an unusable value.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::Invalid(_) => "config_invalid",
        }
    }
}

/// # Host process manager failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HostError {
    /// The OS refused to start the worker program.
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The worker started but its control pipe was not available.
    #[error("worker started without a control pipe")]
    MissingPipe,
}

impl HostError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            HostError::Spawn { .. } => "host_spawn",
            HostError::MissingPipe => "host_missing_pipe",
        }
    }
}

/// # Control-message codec failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Line is not a control message.
    #[error("not a control message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Message could not be serialized.
    #[error("cannot encode control message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// # Worker-side runtime failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// A reserved environment key is missing; the process was not launched by a coordinator.
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    /// The worker id in the environment is not a number.
    #[error("invalid worker id {0:?}")]
    InvalidId(String),

    /// Writing to the control channel failed.
    #[error("control channel: {0}")]
    Channel(#[from] std::io::Error),

    /// Encoding a control message failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
