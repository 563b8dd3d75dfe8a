//! Hook fan-out configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Defaults for `trigger` calls that do not pass explicit options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    /// Per-handler deadline in milliseconds.
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_ms: u64,
    /// Whether a handler failure aborts the remaining chain.
    #[serde(default)]
    pub stop_on_error: bool,
}

impl HookConfig {
    /// Per-handler deadline as a `Duration`.
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: default_handler_timeout(),
            stop_on_error: false,
        }
    }
}

fn default_handler_timeout() -> u64 {
    30_000
}
