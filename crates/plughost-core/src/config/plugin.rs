//! Plugin discovery configuration.

use serde::{Deserialize, Serialize};

/// Plugin discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Root directory scanned for plugin sub-directories.
    #[serde(default = "default_plugin_directory")]
    pub directory: String,
    /// Manifest file name expected inside each plugin directory.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Whether to run a discovery pass on startup.
    #[serde(default = "default_true")]
    pub auto_load: bool,
    /// Whether plugins are activated right after a successful load.
    #[serde(default = "default_true")]
    pub auto_activate: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            directory: default_plugin_directory(),
            manifest_file: default_manifest_file(),
            auto_load: true,
            auto_activate: true,
        }
    }
}

fn default_plugin_directory() -> String {
    "./plugins".to_string()
}

fn default_manifest_file() -> String {
    "plugin.json".to_string()
}

fn default_true() -> bool {
    true
}
