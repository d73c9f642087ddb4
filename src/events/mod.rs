//! Coordinator events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** the coordinator uses to
//! publish what happens to its workers and queue.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publisher**: the coordinator only (supervisor and router run on its sequencing step).
//! - **Consumers**: the subscriber listener (fans out to `SubscriberSet`) and any receiver
//!   obtained from [`Coordinator::subscribe`](crate::Coordinator::subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
