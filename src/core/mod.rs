//! Runtime core: spawning, routing and the coordinator loop.
//!
//! - [`supervisor`]: job queue, running set and the capacity gate;
//! - [`router`]: applies lifecycle signals to the supervisor;
//! - [`coordinator`]: owns both, runs the event loop and handles shutdown;
//! - [`builder`]: assembles a coordinator with subscribers;
//! - `shutdown`: OS termination signals.

mod builder;
mod coordinator;
mod router;
mod shutdown;
mod supervisor;

pub use builder::CoordinatorBuilder;
pub use coordinator::{Coordinator, CoordinatorReport};
