use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::DEFAULT_COMMAND_BUFFER;

/// Session client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Release the in-flight gate when an operation has not completed after
    /// this many milliseconds. `None` waits for the transport indefinitely.
    pub operation_timeout_ms: Option<u64>,
    /// Capacity of the command channel feeding the session loop.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            operation_timeout_ms: None,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl SessionConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}
