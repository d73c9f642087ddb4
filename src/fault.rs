//! # Fault classification at the top-level boundary.
//!
//! [`handle`] turns a [`Fault`] into uniform log lines. It is called once, where
//! [`Coordinator::start_or_exit`](crate::Coordinator::start_or_exit) gives up; steady-state
//! handlers log locally and keep going.
//!
//! ## Payload shapes
//! ```text
//! Structured {a:1, b:2}  →  "a: 1", "b: 2"       (one line per pair)
//! Absent                 →  "unknown error"
//! Opaque "disk full"     →  "disk full"
//! ```
//! A payload is classified by what it looks like, see [`FaultPayload::from_value`].

use std::fmt;

use serde_json::Value;
use tracing::{error, warn};

use crate::error::{ConfigError, RuntimeError};
use crate::host::WorkerId;

/// Fixed line logged for an absent payload.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Failure value sorted by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultPayload {
    /// Key/value pairs (JSON objects arrive sorted by key).
    Structured(Vec<(String, String)>),
    /// No value at all.
    Absent,
    /// Anything else, by its string form.
    Opaque(String),
}

impl FaultPayload {
    /// Classifies a JSON value by shape: object → pairs, `null` → absent, anything else → text.
    ///
    /// # Example
    /// ```
    /// use clustervisor::FaultPayload;
    /// use serde_json::json;
    ///
    /// let p = FaultPayload::from_value(json!({"a": 1, "b": 2}));
    /// assert_eq!(p, FaultPayload::Structured(vec![("a".into(), "1".into()), ("b".into(), "2".into())]));
    /// assert_eq!(FaultPayload::from_value(json!(null)), FaultPayload::Absent);
    /// assert_eq!(FaultPayload::from_value(json!("boom")), FaultPayload::Opaque("boom".into()));
    /// ```
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => FaultPayload::Structured(
                map.into_iter().map(|(k, v)| (k, render(&v))).collect(),
            ),
            Value::Null => FaultPayload::Absent,
            other => FaultPayload::Opaque(render(&other)),
        }
    }

    /// Payload for a typed error, by its `Display` form.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        FaultPayload::Opaque(err.to_string())
    }

    /// Payload built from explicit pairs.
    pub fn structured<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        FaultPayload::Structured(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }

    /// Log lines for this payload.
    pub fn lines(&self) -> Vec<String> {
        match self {
            FaultPayload::Structured(pairs) => {
                pairs.iter().map(|(k, v)| format!("{k}: {v}")).collect()
            }
            FaultPayload::Absent => vec![UNKNOWN_ERROR.to_string()],
            FaultPayload::Opaque(text) => vec![text.clone()],
        }
    }
}

impl fmt::Display for FaultPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join(", "))
    }
}

impl From<Value> for FaultPayload {
    fn from(value: Value) -> Self {
        FaultPayload::from_value(value)
    }
}

impl From<Option<Value>> for FaultPayload {
    fn from(value: Option<Value>) -> Self {
        value.map_or(FaultPayload::Absent, FaultPayload::from_value)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Failure kinds the coordinator knows about.
#[derive(Debug)]
pub enum Fault {
    /// Configuration could not be loaded. Fatal.
    Config(ConfigError),
    /// A worker exited with a non-zero code or a signal. Recoverable.
    WorkerCrash {
        worker: WorkerId,
        job: Option<String>,
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// Anything else escaping the coordinator. Fatal.
    Unhandled(FaultPayload),
}

impl Fault {
    /// Only worker crashes are survivable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Fault::WorkerCrash { .. })
    }

    /// Process status the top level exits with after this fault.
    pub fn exit_code(&self) -> u8 {
        if self.is_fatal() { 1 } else { 0 }
    }

    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Fault::Config(e) => e.as_label(),
            Fault::WorkerCrash { .. } => "worker_crash",
            Fault::Unhandled(_) => "unhandled_fault",
        }
    }

    /// Uniform log lines describing the fault.
    pub fn lines(&self) -> Vec<String> {
        match self {
            Fault::Config(e) => vec![e.to_string()],
            Fault::WorkerCrash {
                worker,
                job,
                code,
                signal,
            } => vec![format!(
                "worker {worker} (job {}) crashed: code={code:?} signal={signal:?}",
                job.as_deref().unwrap_or("-"),
            )],
            Fault::Unhandled(payload) => payload.lines(),
        }
    }
}

impl From<RuntimeError> for Fault {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Config(e) => Fault::Config(e),
            RuntimeError::Hook(payload) => Fault::Unhandled(payload),
            other => Fault::Unhandled(FaultPayload::from_error(&other)),
        }
    }
}

impl From<ConfigError> for Fault {
    fn from(err: ConfigError) -> Self {
        Fault::Config(err)
    }
}

/// Logs the fault line by line and returns what was logged.
///
/// Fatal faults are logged at `error`, crashes at `warn`. The caller decides whether to exit.
pub fn handle(fault: &Fault) -> Vec<String> {
    let label = fault.as_label();
    let lines = fault.lines();
    for line in &lines {
        if fault.is_fatal() {
            error!(fault = label, "{line}");
        } else {
            warn!(fault = label, "{line}");
        }
    }
    lines
}
