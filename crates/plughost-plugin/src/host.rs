//! Plugin host — discovery, ordering, and bulk loading.
//!
//! The host reads every candidate's metadata, hands the whole set to the
//! resolver, and only then loads plugins, in dependency order. A failing
//! plugin never stops the pass; every candidate gets its own result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use plughost_core::config::{LifecycleConfig, PluginConfig};
use plughost_core::{AppError, AppResult, ErrorKind, HostConfig};

use crate::discovery::PluginDiscovery;
use crate::manager::LifecycleManager;
use crate::metadata::PluginSource;
use crate::record::PluginState;
use crate::resolver::DependencyResolver;

/// Outcome for one candidate of a discovery pass.
#[derive(Debug)]
pub struct PluginLoadResult {
    /// Plugin id.
    pub id: String,
    /// State the plugin ended in, or why it did not load.
    pub result: AppResult<PluginState>,
}

impl PluginLoadResult {
    fn new(id: &str, result: AppResult<PluginState>) -> Self {
        Self {
            id: id.to_string(),
            result,
        }
    }

    /// Whether the candidate is usable (loaded or active).
    pub fn is_ok(&self) -> bool {
        matches!(&self.result, Ok(state) if state.satisfies_dependency())
    }
}

/// Couples a discovery source with the lifecycle manager.
#[derive(Debug)]
pub struct PluginHost {
    /// Lifecycle manager driving every load.
    lifecycle: Arc<LifecycleManager>,
    /// Where candidates come from.
    discovery: Arc<dyn PluginDiscovery>,
    /// Plugin loading options.
    plugins: PluginConfig,
    /// Discovery timeout.
    timeouts: LifecycleConfig,
}

impl PluginHost {
    /// Creates a host.
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        discovery: Arc<dyn PluginDiscovery>,
        config: &HostConfig,
    ) -> Self {
        Self {
            lifecycle,
            discovery,
            plugins: config.plugins.clone(),
            timeouts: config.lifecycle.clone(),
        }
    }

    /// Returns the lifecycle manager.
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// Discovers, orders, and loads every candidate.
    ///
    /// - Disabled records are skipped; loaded and active ones are reported
    ///   as they are.
    /// - Records in `Error` are reloaded from the fresh metadata.
    /// - Cycle members never enter `Loading`. Other unorderable candidates
    ///   are still submitted so their `Error` record is kept.
    /// - With `auto_activate`, each plugin is activated right after it loads.
    ///
    /// Only a failed or timed-out discovery fails the whole call.
    pub async fn load_all(&self) -> AppResult<Vec<PluginLoadResult>> {
        let timeout = self.timeouts.discovery_timeout();
        let report = tokio::time::timeout(timeout, self.discovery.discover())
            .await
            .map_err(|_| {
                AppError::timeout(format!(
                    "Plugin discovery timed out after {}ms",
                    timeout.as_millis()
                ))
            })??;

        let registry = self.lifecycle.registry();
        let mut results = Vec::new();

        for (id, error) in report.rejected {
            results.push(PluginLoadResult { id, result: Err(error) });
        }

        let mut candidates = Vec::new();
        let mut reload = HashSet::new();

        for source in report.sources {
            match registry.state(&source.id).await {
                None => candidates.push(source),
                Some(PluginState::Error) => {
                    reload.insert(source.id.clone());
                    candidates.push(source);
                }
                Some(state @ (PluginState::Loaded | PluginState::Active | PluginState::Disabled)) => {
                    debug!(plugin_id = %source.id, state = %state, "Plugin already known, skipping");
                    results.push(PluginLoadResult::new(&source.id, Ok(state)));
                }
                Some(state) => {
                    results.push(PluginLoadResult::new(
                        &source.id,
                        Err(AppError::conflict(format!(
                            "Plugin '{}' is busy ({state})",
                            source.id
                        ))),
                    ));
                }
            }
        }

        let mut available: HashSet<String> = registry
            .ids_in(PluginState::Loaded)
            .await
            .into_iter()
            .collect();
        available.extend(registry.ids_in(PluginState::Active).await);

        let resolution = DependencyResolver::new().partition(&candidates, &available);
        let mut by_id: HashMap<String, PluginSource> = candidates
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        info!(
            ordered = resolution.order.len(),
            blocked = resolution.blocked.len(),
            "Loading discovered plugins"
        );

        for id in &resolution.order {
            let Some(source) = by_id.remove(id) else {
                continue;
            };
            let result = self.load_one(source, reload.contains(id)).await;
            results.push(PluginLoadResult::new(id, result));
        }

        for (id, error) in resolution.blocked {
            if error.is(ErrorKind::CircularDependency) {
                warn!(plugin_id = %id, error = %error, "Plugin is part of a dependency cycle");
                results.push(PluginLoadResult { id, result: Err(error) });
                continue;
            }

            warn!(plugin_id = %id, error = %error, "Plugin has unresolved dependencies");
            if let Some(source) = by_id.remove(&id) {
                // Fails on the dependency check before any plugin code runs.
                if let Err(e) = self.lifecycle.load(source, reload.contains(&id)).await {
                    debug!(plugin_id = %id, error = %e, "Recorded unresolved plugin");
                }
            }
            results.push(PluginLoadResult { id, result: Err(error) });
        }

        let loaded = results.iter().filter(|r| r.is_ok()).count();
        info!(
            total = results.len(),
            loaded,
            failed = results.len() - loaded,
            "Plugin loading pass finished"
        );

        Ok(results)
    }

    async fn load_one(&self, source: PluginSource, force: bool) -> AppResult<PluginState> {
        let id = source.id.clone();
        self.lifecycle.load(source, force).await?;

        if !self.plugins.auto_activate {
            return Ok(PluginState::Loaded);
        }

        self.lifecycle.activate(&id).await?;
        Ok(PluginState::Active)
    }

    /// Unloads every plugin, dependents first.
    pub async fn shutdown(&self) -> AppResult<()> {
        info!("Shutting down plugin host");
        self.lifecycle.unload_all().await
    }
}
