//! Plugin registry — the table of plugin records.
//!
//! Reads are public. Every mutation is crate-private and goes through the
//! lifecycle manager, which serialises transitions per plugin id. Each
//! mutation validates the state edge and keeps `dependents` the exact inverse
//! of `dependencies` across all records.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use plughost_core::{AppError, AppResult};

use crate::hooks::OwnerActivity;
use crate::metadata::PluginSource;
use crate::record::{PluginRecord, PluginState};
use crate::sandbox::Sandbox;
use crate::status::{PluginInfo, StateCounts};
use crate::traits::Plugin;

/// Registry of every plugin the host knows about.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    /// Plugin ID → record.
    records: RwLock<HashMap<String, PluginRecord>>,
}

impl PluginRegistry {
    /// Creates a new empty plugin registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether a record exists for `id`.
    pub async fn contains(&self, id: &str) -> bool {
        self.records.read().await.contains_key(id)
    }

    /// Current state of `id`.
    pub async fn state(&self, id: &str) -> Option<PluginState> {
        self.records.read().await.get(id).map(|r| r.state)
    }

    /// All ids, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids currently in `state`, sorted.
    pub async fn ids_in(&self, state: PluginState) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.state == state)
            .map(|r| r.source.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Snapshot of one record.
    pub async fn info(&self, id: &str) -> Option<PluginInfo> {
        self.records.read().await.get(id).map(PluginInfo::from)
    }

    /// Snapshots of every record, sorted by id.
    pub async fn list(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self
            .records
            .read()
            .await
            .values()
            .map(PluginInfo::from)
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Record count per state.
    pub async fn state_counts(&self) -> StateCounts {
        StateCounts::tally(self.records.read().await.values().map(|r| r.state))
    }

    /// Running instance of `id`, if loaded.
    pub async fn instance(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.records
            .read()
            .await
            .get(id)
            .and_then(|r| r.instance.clone())
    }

    /// Sandbox of `id`, if loaded.
    pub async fn sandbox(&self, id: &str) -> Option<Arc<Sandbox>> {
        self.records
            .read()
            .await
            .get(id)
            .and_then(|r| r.sandbox.clone())
    }

    /// Source the record of `id` was loaded from.
    pub async fn source(&self, id: &str) -> Option<PluginSource> {
        self.records.read().await.get(id).map(|r| r.source.clone())
    }

    /// Registered dependency ids of `id`, in declared order.
    pub async fn dependencies(&self, id: &str) -> Vec<String> {
        self.records
            .read()
            .await
            .get(id)
            .map(|r| r.dependencies.clone())
            .unwrap_or_default()
    }

    /// Ids of plugins depending on `id`, sorted.
    pub async fn dependents(&self, id: &str) -> Vec<String> {
        self.records
            .read()
            .await
            .get(id)
            .map(|r| r.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Active plugins depending on `id`, sorted.
    pub async fn active_dependents(&self, id: &str) -> Vec<String> {
        let records = self.records.read().await;
        records
            .get(id)
            .map(|r| {
                r.dependents
                    .iter()
                    .filter(|d| records.get(d.as_str()).map(|x| x.state) == Some(PluginState::Active))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the cycle `id -> ... -> id` that the edges `id -> deps` would close.
    pub(crate) async fn find_cycle(&self, id: &str, deps: &[String]) -> Option<Vec<String>> {
        let records = self.records.read().await;

        for dep in deps {
            let mut path = vec![id.to_string(), dep.clone()];
            if dep == id || reaches(&records, dep, id, &mut path) {
                return Some(path);
            }
        }

        None
    }

    /// Inserts or re-arms a record and moves it to `Loading`.
    ///
    /// Dependency edges are rebuilt from `source` towards records that exist.
    pub(crate) async fn begin_loading(&self, source: PluginSource) -> AppResult<()> {
        let mut records = self.records.write().await;
        let id = source.id.clone();

        let previous = records.get(&id).map(|r| r.state).unwrap_or(PluginState::Unloaded);
        check_edge(&id, previous, PluginState::Loading)?;

        release_dependencies(&mut records, &id);

        let mut dependencies: Vec<String> = Vec::new();
        for dep in source.dependencies() {
            if records.contains_key(dep.as_str()) && !dependencies.contains(dep) {
                dependencies.push(dep.clone());
            }
        }

        for dep in &dependencies {
            if let Some(target) = records.get_mut(dep) {
                target.dependents.insert(id.clone());
            }
        }

        let record = records
            .entry(id.clone())
            .or_insert_with(|| PluginRecord::new(source.clone()));
        record.source = source;
        record.state = PluginState::Loading;
        record.dependencies = dependencies;

        debug!(plugin_id = %id, from = %previous, "Plugin entered loading");
        Ok(())
    }

    /// Moves `id` along a validated edge, returning the previous state.
    pub(crate) async fn transition(&self, id: &str, next: PluginState) -> AppResult<PluginState> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| not_registered(id))?;

        let previous = record.state;
        check_edge(id, previous, next)?;

        record.state = next;
        match next {
            PluginState::Active => record.activated_at = Some(Utc::now()),
            PluginState::Loaded if previous == PluginState::Loading => {
                record.loaded_at = Some(Utc::now());
                record.error = None;
            }
            _ => {}
        }
        if previous == PluginState::Active {
            record.activated_at = None;
        }

        debug!(plugin_id = %id, from = %previous, to = %next, "Plugin state changed");
        Ok(previous)
    }

    /// Stores the running instance and its sandbox.
    pub(crate) async fn attach(
        &self,
        id: &str,
        instance: Arc<dyn Plugin>,
        sandbox: Arc<Sandbox>,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| not_registered(id))?;
        record.instance = Some(instance);
        record.sandbox = Some(sandbox);
        Ok(())
    }

    /// Drops the sandbox and hands back the instance for cleanup.
    pub(crate) async fn detach(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id)?;
        record.sandbox = None;
        record.instance.take()
    }

    /// Parks `id` in `Error` or `Disabled`, releasing its dependency edges.
    ///
    /// Edges from dependents are kept, so a parked plugin still cannot be
    /// removed while something depends on it.
    pub(crate) async fn park(
        &self,
        id: &str,
        state: PluginState,
        error: Option<String>,
    ) -> AppResult<PluginState> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| not_registered(id))?;

        let previous = record.state;
        check_edge(id, previous, state)?;

        record.state = state;
        record.activated_at = None;
        if error.is_some() {
            record.error = error;
        }
        release_dependencies(&mut records, id);

        debug!(plugin_id = %id, from = %previous, to = %state, "Plugin parked");
        Ok(previous)
    }

    /// Removes the record of `id`, moving it to `Unloaded`.
    ///
    /// Fails with `UnloadBlocked` while other records depend on it.
    pub(crate) async fn remove(&self, id: &str) -> AppResult<PluginRecord> {
        let mut records = self.records.write().await;
        let record = records.get(id).ok_or_else(|| not_registered(id))?;

        check_edge(id, record.state, PluginState::Unloaded)?;
        if !record.dependents.is_empty() {
            return Err(unload_blocked(id, record.dependents.iter()));
        }

        release_dependencies(&mut records, id);
        let mut record = records.remove(id).ok_or_else(|| not_registered(id))?;
        record.state = PluginState::Unloaded;

        debug!(plugin_id = %id, "Plugin record removed");
        Ok(record)
    }

    /// Fails with `UnloadBlocked` if `id` has dependents.
    pub(crate) async fn ensure_removable(&self, id: &str) -> AppResult<()> {
        let records = self.records.read().await;
        let record = records.get(id).ok_or_else(|| not_registered(id))?;
        if record.dependents.is_empty() {
            Ok(())
        } else {
            Err(unload_blocked(id, record.dependents.iter()))
        }
    }
}

#[async_trait]
impl OwnerActivity for PluginRegistry {
    async fn is_active(&self, owner_id: &str) -> bool {
        self.state(owner_id).await == Some(PluginState::Active)
    }
}

fn check_edge(id: &str, from: PluginState, to: PluginState) -> AppResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::invalid_transition(format!(
            "Plugin '{id}' cannot move from {from} to {to}"
        )))
    }
}

fn not_registered(id: &str) -> AppError {
    AppError::not_found(format!("Plugin '{id}' is not registered"))
}

fn unload_blocked<'a>(id: &str, dependents: impl Iterator<Item = &'a String>) -> AppError {
    let names: Vec<&str> = dependents.map(String::as_str).collect();
    AppError::unload_blocked(format!(
        "Plugin '{id}' is required by: {}",
        names.join(", ")
    ))
}

/// Removes `id` from the dependents of everything it depends on.
fn release_dependencies(records: &mut HashMap<String, PluginRecord>, id: &str) {
    let dependencies = match records.get_mut(id) {
        Some(record) => std::mem::take(&mut record.dependencies),
        None => return,
    };

    for dep in dependencies {
        if let Some(target) = records.get_mut(&dep) {
            target.dependents.remove(id);
        }
    }
}

/// Depth-first search along registered dependency edges.
fn reaches(
    records: &HashMap<String, PluginRecord>,
    from: &str,
    target: &str,
    path: &mut Vec<String>,
) -> bool {
    let Some(record) = records.get(from) else {
        return false;
    };

    for dep in &record.dependencies {
        if path.iter().skip(1).any(|p| p == dep) && dep != target {
            continue;
        }
        path.push(dep.clone());
        if dep == target || reaches(records, dep, target, path) {
            return true;
        }
        path.pop();
    }

    false
}
