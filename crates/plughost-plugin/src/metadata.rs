//! Declared plugin metadata and the source it was read from.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use plughost_core::{AppError, AppResult};

/// Metadata a plugin declares in its manifest.
///
/// Read without executing any plugin code; everything the host needs to
/// order, sandbox, and wire a plugin comes from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Human-readable plugin name.
    pub name: String,
    /// Plugin version string (`1`, `1.2`, `1.2.3`, optional `-pre`/`+build` suffix).
    pub version: String,
    /// Plugin description.
    #[serde(default)]
    pub description: String,
    /// Main entry reference, used to pick the factory or loader.
    pub main: String,
    /// Ids of plugins this one requires, in activation order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Hook names this plugin subscribes to.
    #[serde(default)]
    pub hooks: Vec<String>,
    /// Permissions this plugin requires.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Interface names this plugin provides to other plugins.
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// APIs and interfaces this plugin is allowed to call.
    #[serde(default)]
    pub apis: Vec<String>,
}

impl PluginMetadata {
    /// Creates metadata with the required fields and empty lists.
    pub fn new(name: &str, version: &str, main: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
            main: main.to_string(),
            dependencies: Vec::new(),
            hooks: Vec::new(),
            permissions: Vec::new(),
            interfaces: Vec::new(),
            apis: Vec::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Adds a dependency.
    pub fn with_dependency(mut self, id: &str) -> Self {
        self.dependencies.push(id.to_string());
        self
    }

    /// Adds a hook subscription.
    pub fn with_hook(mut self, hook: &str) -> Self {
        self.hooks.push(hook.to_string());
        self
    }

    /// Adds a required permission.
    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.push(permission.to_string());
        self
    }

    /// Adds a provided interface.
    pub fn with_interface(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Adds an allowed API.
    pub fn with_api(mut self, api: &str) -> Self {
        self.apis.push(api.to_string());
        self
    }

    /// Returns whether the plugin declared a subscription to `hook`.
    pub fn declares_hook(&self, hook: &str) -> bool {
        self.hooks.iter().any(|h| h == hook)
    }

    /// Validates required fields and list hygiene.
    pub fn validate(&self, plugin_id: &str) -> AppResult<()> {
        let fail = |reason: String| {
            Err(AppError::validation(format!(
                "Plugin '{plugin_id}' has invalid metadata: {reason}"
            )))
        };

        if self.name.trim().is_empty() {
            return fail("name is empty".to_string());
        }
        if self.main.trim().is_empty() {
            return fail("main entry is empty".to_string());
        }
        if !is_valid_version(&self.version) {
            return fail(format!("version '{}' is not a dotted number", self.version));
        }

        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            if dep.trim().is_empty() {
                return fail("dependency id is empty".to_string());
            }
            if !seen.insert(dep.as_str()) {
                return fail(format!("dependency '{dep}' is listed twice"));
            }
        }

        if let Some(hook) = self.hooks.iter().find(|h| h.trim().is_empty()) {
            return fail(format!("hook name '{hook}' is empty"));
        }
        if let Some(name) = self.interfaces.iter().find(|i| i.trim().is_empty()) {
            return fail(format!("interface name '{name}' is empty"));
        }

        Ok(())
    }
}

fn is_valid_version(version: &str) -> bool {
    let core = version.split(['-', '+']).next().unwrap_or_default();
    let parts: Vec<&str> = core.split('.').collect();

    (1..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// A discovered plugin: where it came from and what it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSource {
    /// Stable identifier derived from the location.
    pub id: String,
    /// Source location (plugin directory for on-disk plugins).
    pub location: PathBuf,
    /// Declared metadata.
    pub metadata: PluginMetadata,
}

impl PluginSource {
    /// Creates a source with an explicit id.
    pub fn new(id: &str, location: impl Into<PathBuf>, metadata: PluginMetadata) -> Self {
        Self {
            id: id.to_string(),
            location: location.into(),
            metadata,
        }
    }

    /// Creates a source whose id is the last component of `location`.
    pub fn from_location(location: &Path, metadata: PluginMetadata) -> AppResult<Self> {
        let id = location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                AppError::validation(format!(
                    "Cannot derive a plugin id from '{}'",
                    location.display()
                ))
            })?;

        Ok(Self {
            id,
            location: location.to_path_buf(),
            metadata,
        })
    }

    /// Creates a source for a compiled-in plugin with no on-disk location.
    pub fn builtin(id: &str, metadata: PluginMetadata) -> Self {
        Self::new(id, format!("builtin:{id}"), metadata)
    }

    /// Declared dependency ids.
    pub fn dependencies(&self) -> &[String] {
        &self.metadata.dependencies
    }
}
