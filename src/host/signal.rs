use crate::protocol::ControlMessage;

use super::WorkerId;

/// What the host observed about one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// Worker record created.
    Fork { worker: WorkerId },
    /// Worker process is running.
    Online { worker: WorkerId },
    /// Worker sent a control message.
    Message {
        worker: WorkerId,
        message: ControlMessage,
    },
    /// Worker is gone. `code` is `None` when killed by `signal`.
    Exit {
        worker: WorkerId,
        code: Option<i32>,
        signal: Option<i32>,
    },
}

impl LifecycleSignal {
    /// The worker this signal is about.
    pub fn worker(&self) -> WorkerId {
        match self {
            LifecycleSignal::Fork { worker }
            | LifecycleSignal::Online { worker }
            | LifecycleSignal::Message { worker, .. }
            | LifecycleSignal::Exit { worker, .. } => *worker,
        }
    }
}
