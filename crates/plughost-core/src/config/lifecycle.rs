//! Lifecycle deadlines.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadlines applied to plugin lifecycle hooks and to discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Deadline for each `init`/`activate`/`deactivate`/`cleanup`/`handle_action` call.
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_ms: u64,
    /// Deadline for one discovery pass.
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_ms: u64,
}

impl LifecycleConfig {
    /// Lifecycle hook deadline as a `Duration`.
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }

    /// Discovery deadline as a `Duration`.
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            hook_timeout_ms: default_hook_timeout(),
            discovery_timeout_ms: default_discovery_timeout(),
        }
    }
}

fn default_hook_timeout() -> u64 {
    5_000
}

fn default_discovery_timeout() -> u64 {
    10_000
}
