//! Plugin context — the host surface handed to a plugin at `init`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use plughost_core::AppResult;

use crate::hooks::definitions::{HookContext, TriggerOptions};
use crate::hooks::dispatcher::HookDispatcher;
use crate::interfaces::InterfaceBroker;
use crate::sandbox::{PERMISSION_TRIGGER_HOOKS, Sandbox};

/// Context passed to a plugin while it initialises.
///
/// Everything reachable from here is gated by the plugin's sandbox.
#[derive(Clone)]
pub struct PluginContext {
    /// Id of the plugin this context belongs to.
    plugin_id: String,
    /// Where the plugin was loaded from.
    location: PathBuf,
    /// The plugin's capability sandbox.
    sandbox: Arc<Sandbox>,
    /// Shared hook dispatcher.
    dispatcher: Arc<HookDispatcher>,
    /// Routes interface calls made by this plugin.
    broker: Arc<dyn InterfaceBroker>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("location", &self.location)
            .finish()
    }
}

impl PluginContext {
    /// Creates a context for `plugin_id`.
    pub fn new(
        plugin_id: &str,
        location: &Path,
        sandbox: Arc<Sandbox>,
        dispatcher: Arc<HookDispatcher>,
        broker: Arc<dyn InterfaceBroker>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            location: location.to_path_buf(),
            sandbox,
            dispatcher,
            broker,
        }
    }

    /// Plugin id.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Plugin source location.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The plugin's sandbox, for its own capability checks.
    pub fn sandbox(&self) -> &Arc<Sandbox> {
        &self.sandbox
    }

    /// Fires a hook on behalf of the plugin.
    ///
    /// Requires the `hooks.trigger` permission; otherwise `SandboxDenied`.
    pub async fn trigger(&self, hook: &str, context: HookContext) -> AppResult<HookContext> {
        self.sandbox.require_permission(PERMISSION_TRIGGER_HOOKS)?;
        self.dispatcher
            .trigger(hook, context, self.dispatcher.default_options())
            .await
    }

    /// Like [`trigger`](Self::trigger) with explicit options.
    pub async fn trigger_with(
        &self,
        hook: &str,
        context: HookContext,
        options: TriggerOptions,
    ) -> AppResult<HookContext> {
        self.sandbox.require_permission(PERMISSION_TRIGGER_HOOKS)?;
        self.dispatcher.trigger(hook, context, options).await
    }

    /// Calls `action` on the plugin providing `interface`.
    ///
    /// The call is made as this plugin: it must be active and its sandbox
    /// must list the interface (or `*`) in its APIs.
    pub async fn call_interface(
        &self,
        interface: &str,
        action: &str,
        payload: Value,
    ) -> AppResult<Value> {
        self.broker
            .call_interface(&self.plugin_id, interface, action, payload)
            .await
    }
}
