//! Capability sandbox policy.

use serde::{Deserialize, Serialize};

/// Host-wide limits on what plugins may request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Permissions the host is willing to grant. Empty means no restriction.
    #[serde(default)]
    pub grantable_permissions: Vec<String>,
}

impl SandboxConfig {
    /// Returns whether a plugin may be granted `permission`.
    pub fn is_grantable(&self, permission: &str) -> bool {
        self.grantable_permissions.is_empty()
            || self.grantable_permissions.iter().any(|p| p == permission)
    }
}
