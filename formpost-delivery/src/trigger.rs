use std::fmt;

use serde::{Deserialize, Serialize};

/// The lifecycle point that asked for a flush.
///
/// Every trigger runs the same flush; the trigger only shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlushTrigger {
    /// The host finished handling a request
    RequestTerminated,
    /// Debug mode flushes immediately after each submission
    Debug,
    /// An operator ran `formpostctl flush`
    Command,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RequestTerminated => "request-terminated",
            Self::Debug => "debug",
            Self::Command => "command",
        })
    }
}
