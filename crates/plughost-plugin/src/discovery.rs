//! Plugin discovery — enumerates candidate sources without running plugin code.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use plughost_core::config::PluginConfig;
use plughost_core::{AppError, AppResult};

use crate::metadata::{PluginMetadata, PluginSource};

/// Result of one discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Candidates with readable metadata, sorted by id.
    pub sources: Vec<PluginSource>,
    /// Candidates whose metadata could not be read, with the reason.
    pub rejected: Vec<(String, AppError)>,
}

/// Enumerates plugin sources.
#[async_trait]
pub trait PluginDiscovery: Send + Sync + std::fmt::Debug {
    /// Runs one discovery pass.
    async fn discover(&self) -> AppResult<DiscoveryReport>;
}

/// Discovers plugins as sub-directories of a root holding a manifest file.
///
/// ```text
/// plugins/
///   event-log/
///     plugin.json
///   mail-rules/
///     plugin.json
/// ```
///
/// The directory name is the plugin id.
#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    /// Directory scanned for plugins.
    root: PathBuf,
    /// Manifest file name inside each plugin directory.
    manifest_file: String,
}

impl DirectoryDiscovery {
    /// Creates a discovery over `root`.
    pub fn new(root: impl Into<PathBuf>, manifest_file: &str) -> Self {
        Self {
            root: root.into(),
            manifest_file: manifest_file.to_string(),
        }
    }

    /// Creates a discovery from the `plugins` config section.
    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(&config.directory, &config.manifest_file)
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_manifest(&self, dir: &Path) -> AppResult<PluginMetadata> {
        let path = dir.join(&self.manifest_file);
        let content = fs::read_to_string(&path).await?;

        serde_json::from_str(&content).map_err(|e| {
            AppError::validation(format!(
                "Malformed manifest '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl PluginDiscovery for DirectoryDiscovery {
    async fn discover(&self) -> AppResult<DiscoveryReport> {
        let mut report = DiscoveryReport::default();

        if !fs::try_exists(&self.root).await? {
            warn!(root = %self.root.display(), "Plugin directory does not exist");
            return Ok(report);
        }

        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if !fs::try_exists(path.join(&self.manifest_file)).await? {
                debug!(path = %path.display(), "Skipping directory without manifest");
                continue;
            }

            let id = entry.file_name().to_string_lossy().into_owned();
            let result = self
                .read_manifest(&path)
                .await
                .and_then(|metadata| PluginSource::from_location(&path, metadata));

            match result {
                Ok(source) => {
                    debug!(plugin_id = %source.id, path = %path.display(), "Found plugin");
                    report.sources.push(source);
                }
                Err(e) => {
                    warn!(plugin_id = %id, error = %e, "Rejected plugin manifest");
                    report.rejected.push((id, e));
                }
            }
        }

        report.sources.sort_by(|a, b| a.id.cmp(&b.id));
        report.rejected.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            root = %self.root.display(),
            found = report.sources.len(),
            rejected = report.rejected.len(),
            "Plugin discovery finished"
        );

        Ok(report)
    }
}

/// Discovery over a fixed, in-memory list of sources.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    sources: Vec<PluginSource>,
}

impl StaticDiscovery {
    /// Creates a discovery that always reports `sources`.
    pub fn new(sources: Vec<PluginSource>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl PluginDiscovery for StaticDiscovery {
    async fn discover(&self) -> AppResult<DiscoveryReport> {
        Ok(DiscoveryReport {
            sources: self.sources.clone(),
            rejected: Vec::new(),
        })
    }
}
