//! # Worker → coordinator control messages.
//!
//! A worker writes one JSON object per line on its stdout; the coordinator decodes each line
//! with [`ControlMessage::decode`]. Lines that do not decode are ordinary worker output.
//!
//! ## Wire format
//! ```text
//! {"action":"check-queue","message":"page 3 done"}
//! {"action":"handle-error"}
//! {"message":"just a note"}
//! ```
//! - `action` (alias `actions`): one of `check-queue`, `handle-error`, `unhandled-exception`.
//! - `message`: free text, surfaced verbatim by the coordinator.
//! - Unknown keys make the line a non-message.
//!
//! ## Rules
//! - Messages flow worker → coordinator only.
//! - Every action is received and classified; none changes queue state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Action requested by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Worker asks the coordinator to look at the queue.
    CheckQueue,
    /// Worker reports an error it handled itself.
    HandleError,
    /// Worker reports an error that escaped its job body.
    UnhandledException,
}

impl Action {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CheckQueue => "check-queue",
            Action::HandleError => "handle-error",
            Action::UnhandledException => "unhandled-exception",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured notification sent from a worker to the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlMessage {
    #[serde(default, alias = "actions", skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlMessage {
    /// Message carrying only an action.
    pub fn action(action: Action) -> Self {
        Self {
            action: Some(action),
            message: None,
        }
    }

    /// Attaches free text.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Decodes one line of worker output.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(line.trim()).map_err(ProtocolError::Decode)
    }

    /// Encodes as a single JSON line, newline included.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(self).map_err(ProtocolError::Encode)?;
        line.push('\n');
        Ok(line)
    }
}
