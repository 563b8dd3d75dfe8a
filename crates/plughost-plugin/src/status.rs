//! Read-only status snapshots for status panels and health checks.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::{PluginRecord, PluginState};

/// Snapshot of one plugin record.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    /// Plugin id.
    pub id: String,
    /// Human-readable plugin name.
    pub name: String,
    /// Plugin version string.
    pub version: String,
    /// Plugin description.
    pub description: String,
    /// Current state.
    pub state: PluginState,
    /// Declared dependency ids.
    pub dependencies: Vec<String>,
    /// Ids of loaded plugins depending on this one.
    pub dependents: Vec<String>,
    /// Declared hook subscriptions.
    pub hooks: Vec<String>,
    /// Provided interfaces.
    pub interfaces: Vec<String>,
    /// Declared permissions.
    pub permissions: Vec<String>,
    /// Last fatal error message.
    pub error: Option<String>,
    /// When the plugin last finished loading.
    pub loaded_at: Option<DateTime<Utc>>,
    /// When the plugin last became active.
    pub activated_at: Option<DateTime<Utc>>,
}

impl From<&PluginRecord> for PluginInfo {
    fn from(record: &PluginRecord) -> Self {
        let metadata = &record.source.metadata;

        Self {
            id: record.source.id.clone(),
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            description: metadata.description.clone(),
            state: record.state,
            dependencies: metadata.dependencies.clone(),
            dependents: record.dependents.iter().cloned().collect(),
            hooks: metadata.hooks.clone(),
            interfaces: metadata.interfaces.clone(),
            permissions: metadata.permissions.clone(),
            error: record.error.clone(),
            loaded_at: record.loaded_at,
            activated_at: record.activated_at,
        }
    }
}

/// Number of records per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    /// Records in `Unloaded`.
    pub unloaded: usize,
    /// Records in `Loading`.
    pub loading: usize,
    /// Records in `Loaded`.
    pub loaded: usize,
    /// Records in `Active`.
    pub active: usize,
    /// Records in `Error`.
    pub error: usize,
    /// Records in `Disabled`.
    pub disabled: usize,
}

impl StateCounts {
    /// Counts the given states.
    pub fn tally(states: impl IntoIterator<Item = PluginState>) -> Self {
        let mut counts = Self::default();
        for state in states {
            *counts.slot(state) += 1;
        }
        counts
    }

    /// Count for one state.
    pub fn get(&self, state: PluginState) -> usize {
        match state {
            PluginState::Unloaded => self.unloaded,
            PluginState::Loading => self.loading,
            PluginState::Loaded => self.loaded,
            PluginState::Active => self.active,
            PluginState::Error => self.error,
            PluginState::Disabled => self.disabled,
        }
    }

    fn slot(&mut self, state: PluginState) -> &mut usize {
        match state {
            PluginState::Unloaded => &mut self.unloaded,
            PluginState::Loading => &mut self.loading,
            PluginState::Loaded => &mut self.loaded,
            PluginState::Active => &mut self.active,
            PluginState::Error => &mut self.error,
            PluginState::Disabled => &mut self.disabled,
        }
    }
}

/// Host-wide status.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    /// Total records in the registry.
    pub total: usize,
    /// Records per state.
    pub states: StateCounts,
    /// Distinct hook names with at least one subscription.
    pub hook_count: usize,
    /// Total hook subscriptions.
    pub subscription_count: usize,
    /// Registered interfaces.
    pub interface_count: usize,
}
