//! # Pre-start hook.
//!
//! A [`PreStart`] hook runs once, before the first worker is spawned (logging in,
//! warming a cache, checking credentials). If it fails, the coordinator never spawns
//! anything and [`Coordinator::start`](crate::Coordinator::start) returns
//! [`RuntimeError::Hook`](crate::RuntimeError::Hook).
//!
//! [`HookFn`] wraps a closure producing a fresh future per call, like a task function.
//!
//! ## Example
//! ```rust
//! use clustervisor::{FaultPayload, HookFn, PreStartRef};
//!
//! let hook: PreStartRef = HookFn::arc(|| async {
//!     Ok::<_, FaultPayload>(())
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::fault::FaultPayload;

/// Shared handle to a hook.
pub type PreStartRef = Arc<dyn PreStart>;

/// One-shot asynchronous step run before spawning.
#[async_trait]
pub trait PreStart: Send + Sync + 'static {
    /// Runs the hook. The error keeps its shape for the fault classifier.
    async fn before_start(&self) -> Result<(), FaultPayload>;
}

/// Closure-backed hook.
pub struct HookFn<F> {
    f: F,
}

impl<F> HookFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the hook and returns it as a shared handle.
    pub fn arc<Fut>(f: F) -> PreStartRef
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), FaultPayload>> + Send + 'static,
    {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> PreStart for HookFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), FaultPayload>> + Send + 'static,
{
    async fn before_start(&self) -> Result<(), FaultPayload> {
        (self.f)().await
    }
}
