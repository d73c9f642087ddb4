//! # Cluster configuration.
//!
//! [`ClusterConfig`] holds everything the coordinator needs; it is read-only once the
//! coordinator is built. It is either assembled in code or loaded from a JSON document
//! via [`ClusterConfig::from_file`].
//!
//! ## Document format
//! ```json
//! {
//!   "QUEUE": ["site-a", "site-b", "site-c"],
//!   "ARGS": ["--headless"],
//!   "ENV_VARIABLES": { "PROXY": "http://127.0.0.1:8080" },
//!   "SILENT_MODE": false,
//!   "WORKER_LIMIT": 4,
//!   "LOOP": false
//! }
//! ```
//! `QUEUE` and `WORKER_LIMIT` are required; the rest default to empty / `false`.
//!
//! ## Worker limit
//! `WORKER_LIMIT` must be positive and is clamped to the CPU count when loaded from a file
//! (see [`clamp_worker_limit`]). Limits set in code are taken as given.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::hook::PreStartRef;
use crate::worker::JOB_ENV;

/// Clamps a requested worker limit into `1..=cpus`.
///
/// ```
/// use clustervisor::clamp_worker_limit;
///
/// assert_eq!(clamp_worker_limit(16, 4), 4);
/// assert_eq!(clamp_worker_limit(2, 4), 2);
/// assert_eq!(clamp_worker_limit(0, 4), 1);
/// ```
#[inline]
pub fn clamp_worker_limit(requested: usize, cpus: usize) -> usize {
    requested.min(cpus.max(1)).max(1)
}

/// On-disk cluster document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ClusterFile {
    pub queue: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub silent_mode: bool,
    pub worker_limit: usize,
    #[serde(default, rename = "LOOP")]
    pub looping: bool,
}

impl ClusterFile {
    /// Reads and parses the document at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validates the document and turns it into a runtime config, clamping the limit to `cpus`.
    pub fn into_config(self, cpus: usize) -> Result<ClusterConfig, ConfigError> {
        if self.worker_limit == 0 {
            return Err(ConfigError::Invalid(
                "WORKER_LIMIT must be a positive integer".into(),
            ));
        }
        if self.env_variables.contains_key(JOB_ENV) {
            return Err(ConfigError::Invalid(format!(
                "ENV_VARIABLES must not set reserved key {JOB_ENV}"
            )));
        }
        Ok(ClusterConfig {
            worker_limit: clamp_worker_limit(self.worker_limit, cpus),
            args: self.args,
            env: self.env_variables,
            silent: self.silent_mode,
            looping: self.looping,
            ..ClusterConfig::new(self.queue, self.worker_limit)
        })
    }
}

/// Runtime configuration for a [`Coordinator`](crate::Coordinator).
///
/// ## Field semantics
/// - `queue`: job identifiers in listed order (the last one runs first)
/// - `worker_limit`: maximum simultaneously running workers (min 1)
/// - `args` / `env` / `silent`: passed to every worker launch
/// - `looping`: recycle dequeued jobs, never drain
/// - `grace`: how long to wait for workers after a shutdown signal
/// - `handle_os_signals`: react to SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `pre_start`: optional hook awaited once before the first spawn
#[derive(Clone)]
pub struct ClusterConfig {
    pub queue: Vec<String>,
    pub worker_limit: usize,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub silent: bool,
    pub looping: bool,
    pub grace: Duration,
    pub handle_os_signals: bool,
    pub bus_capacity: usize,
    pub pre_start: Option<PreStartRef>,
}

impl ClusterConfig {
    /// Config for `queue` with `worker_limit` and defaults everywhere else.
    ///
    /// Defaults: no args, empty env, not silent, no looping, `grace = 30s`,
    /// OS signals handled, `bus_capacity = 1024`, no hook.
    pub fn new<I, S>(queue: I, worker_limit: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: queue.into_iter().map(Into::into).collect(),
            worker_limit,
            args: Vec::new(),
            env: BTreeMap::new(),
            silent: false,
            looping: false,
            grace: Duration::from_secs(30),
            handle_os_signals: true,
            bus_capacity: 1024,
            pre_start: None,
        }
    }

    /// Loads a JSON cluster document and clamps its limit to this machine's CPUs.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ClusterFile::load(path)?.into_config(num_cpus::get())
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.handle_os_signals = enabled;
        self
    }

    pub fn with_pre_start(mut self, hook: PreStartRef) -> Self {
        self.pre_start = Some(hook);
        self
    }

    /// Worker limit clamped to a minimum of 1.
    #[inline]
    pub fn worker_limit_clamped(&self) -> usize {
        self.worker_limit.max(1)
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Fresh environment for one worker: base variables plus the job key.
    pub fn worker_env(&self, job: &str) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.insert(JOB_ENV.to_string(), job.to_string());
        env
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("queue", &self.queue)
            .field("worker_limit", &self.worker_limit)
            .field("args", &self.args)
            .field("env", &self.env)
            .field("silent", &self.silent)
            .field("looping", &self.looping)
            .field("grace", &self.grace)
            .field("handle_os_signals", &self.handle_os_signals)
            .field("bus_capacity", &self.bus_capacity)
            .field("pre_start", &self.pre_start.is_some())
            .finish()
    }
}
