//! Capability sandbox — per-plugin permission and API allowlist checks.
//!
//! The sandbox is an advisory capability gate, **not** an isolation boundary:
//! plugins run in-process with full access to the address space. It only
//! answers whether a plugin declared a capability, and host code must treat a
//! `false` answer as a hard denial instead of retrying through another path.

use std::collections::HashSet;

use plughost_core::config::SandboxConfig;
use plughost_core::{AppError, AppResult};

use crate::metadata::PluginMetadata;

/// Permission required to fire hooks from plugin code.
pub const PERMISSION_TRIGGER_HOOKS: &str = "hooks.trigger";

/// Allowlist entry granting every API.
pub const ANY_API: &str = "*";

/// Capability context captured from a plugin's metadata at load time.
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Owning plugin.
    plugin_id: String,
    /// Granted permissions.
    permissions: HashSet<String>,
    /// Callable APIs and interfaces.
    api_allowlist: HashSet<String>,
}

impl Sandbox {
    /// Creates a sandbox from explicit sets.
    pub fn new<P, A>(plugin_id: &str, permissions: P, apis: A) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            plugin_id: plugin_id.to_string(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            api_allowlist: apis.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates the sandbox for a plugin, enforcing the host's grant policy.
    ///
    /// Fails with `SandboxDenied` if the plugin asks for a permission the host
    /// does not grant.
    pub fn create(
        plugin_id: &str,
        metadata: &PluginMetadata,
        policy: &SandboxConfig,
    ) -> AppResult<Self> {
        if let Some(denied) = metadata
            .permissions
            .iter()
            .find(|p| !policy.is_grantable(p))
        {
            return Err(AppError::sandbox_denied(format!(
                "Plugin '{plugin_id}' requests permission '{denied}', which this host does not grant"
            )));
        }

        Ok(Self::new(
            plugin_id,
            metadata.permissions.iter().cloned(),
            metadata.apis.iter().cloned(),
        ))
    }

    /// Returns the owning plugin id.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Returns whether `name` was granted.
    pub fn check_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }

    /// Returns whether the plugin may call API `name`.
    pub fn check_api(&self, name: &str) -> bool {
        self.api_allowlist.contains(ANY_API) || self.api_allowlist.contains(name)
    }

    /// Like [`check_permission`](Self::check_permission), as a `SandboxDenied` error.
    pub fn require_permission(&self, name: &str) -> AppResult<()> {
        if self.check_permission(name) {
            Ok(())
        } else {
            Err(AppError::sandbox_denied(format!(
                "Plugin '{}' lacks permission '{}'",
                self.plugin_id, name
            )))
        }
    }

    /// Like [`check_api`](Self::check_api), as a `SandboxDenied` error.
    pub fn require_api(&self, name: &str) -> AppResult<()> {
        if self.check_api(name) {
            Ok(())
        } else {
            Err(AppError::sandbox_denied(format!(
                "Plugin '{}' is not allowed to call '{}'",
                self.plugin_id, name
            )))
        }
    }

    /// Granted permissions, sorted.
    pub fn permissions(&self) -> Vec<String> {
        let mut permissions: Vec<String> = self.permissions.iter().cloned().collect();
        permissions.sort();
        permissions
    }
}
