//! Plugin records and the lifecycle state machine.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::PluginSource;
use crate::sandbox::Sandbox;
use crate::traits::Plugin;

/// Lifecycle state of a plugin record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Slot reserved, nothing loaded.
    Unloaded,
    /// Metadata read, instance being constructed.
    Loading,
    /// Instance constructed and initialised, hooks registered.
    Loaded,
    /// Running; hook handlers are invoked.
    Active,
    /// Last load or activation failed; the record is kept for diagnostics.
    Error,
    /// Administratively disabled; never reloaded automatically.
    Disabled,
}

impl PluginState {
    /// All states, in display order.
    pub const ALL: [PluginState; 6] = [
        Self::Unloaded,
        Self::Loading,
        Self::Loaded,
        Self::Active,
        Self::Error,
        Self::Disabled,
    ];

    /// Returns the string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Active => "active",
            Self::Error => "error",
            Self::Disabled => "disabled",
        }
    }

    /// Returns whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;

        matches!(
            (self, next),
            (Unloaded, Loading)
                | (Loading, Loaded)
                | (Loading, Error)
                | (Loaded, Active)
                | (Active, Loaded)
                | (Active, Error)
                | (Loaded, Unloaded)
                | (Error, Unloaded)
                | (Error, Loading)
                | (Disabled, Loading)
                | (Disabled, Unloaded)
        ) || (next == Disabled && self != Disabled)
    }

    /// Returns whether a dependent may load against a dependency in this state.
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, Self::Loaded | Self::Active)
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the host tracks about one plugin.
#[derive(Debug)]
pub struct PluginRecord {
    /// Current lifecycle state.
    pub(crate) state: PluginState,
    /// Source and metadata the record was loaded from.
    pub(crate) source: PluginSource,
    /// Running instance, present from a successful load until unload.
    pub(crate) instance: Option<Arc<dyn Plugin>>,
    /// Capability context, present alongside the instance.
    pub(crate) sandbox: Option<Arc<Sandbox>>,
    /// Ids this plugin depends on (edges registered at load), in declared order.
    pub(crate) dependencies: Vec<String>,
    /// Ids depending on this plugin; inverse of `dependencies`.
    pub(crate) dependents: BTreeSet<String>,
    /// Last fatal error message.
    pub(crate) error: Option<String>,
    /// When the plugin last reached `Loaded` from `Loading`.
    pub(crate) loaded_at: Option<DateTime<Utc>>,
    /// When the plugin last became `Active`.
    pub(crate) activated_at: Option<DateTime<Utc>>,
}

impl PluginRecord {
    /// Creates an empty record in `Unloaded`.
    pub(crate) fn new(source: PluginSource) -> Self {
        Self {
            state: PluginState::Unloaded,
            source,
            instance: None,
            sandbox: None,
            dependencies: Vec::new(),
            dependents: BTreeSet::new(),
            error: None,
            loaded_at: None,
            activated_at: None,
        }
    }

    /// Plugin id.
    pub fn id(&self) -> &str {
        &self.source.id
    }

    /// Current state.
    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Source the record was loaded from.
    pub fn source(&self) -> &PluginSource {
        &self.source
    }

    /// Last fatal error message.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
