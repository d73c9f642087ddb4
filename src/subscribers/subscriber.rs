//! # Subscriber trait.
//!
//! [`Subscribe`] is how callers observe a run: worker spawns, exits, crashes, control
//! messages and the shutdown path all arrive as [`Event`]s.
//!
//! Delivery happens off the coordinator's loop. A subscriber that stalls or overflows
//! loses its own events; worker supervision is never delayed by it.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use clustervisor::{Event, EventKind, Subscribe};
//!
//! struct CrashCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerCrashed {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "crash-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of coordinator events.
///
/// Implementations should not block the executor; panics are caught and logged.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Calls for a given subscriber never overlap and arrive in publish order.
    async fn on_event(&self, event: &Event);

    /// Short label for log lines about this subscriber. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered before new ones are dropped for this subscriber (at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
