//! Interface registry — which plugin provides which named interface.
//!
//! [`InterfaceRouter`] carries plugin-to-plugin calls: the caller must be
//! active and allowed by its sandbox, and the provider must be active.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use plughost_core::{AppError, AppResult};

use crate::manager::run_guarded;
use crate::record::PluginState;
use crate::registry::PluginRegistry;

/// Maps interface names to the id of the providing plugin.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    /// Interface name → provider id.
    providers: RwLock<HashMap<String, String>>,
}

impl InterfaceRegistry {
    /// Creates an empty interface registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `owner_id` as the provider of `name`.
    ///
    /// Re-registering by the same owner is a no-op; any other owner gets `Conflict`.
    pub async fn register(&self, name: &str, owner_id: &str) -> AppResult<()> {
        let mut providers = self.providers.write().await;

        match providers.get(name) {
            Some(existing) if existing == owner_id => Ok(()),
            Some(existing) => Err(AppError::conflict(format!(
                "Interface '{name}' is already provided by plugin '{existing}'"
            ))),
            None => {
                debug!(interface = %name, plugin_id = %owner_id, "Interface registered");
                providers.insert(name.to_string(), owner_id.to_string());
                Ok(())
            }
        }
    }

    /// Removes every interface provided by `owner_id`; returns how many.
    pub async fn unregister_all(&self, owner_id: &str) -> usize {
        let mut providers = self.providers.write().await;
        let before = providers.len();
        providers.retain(|_, owner| owner != owner_id);
        before - providers.len()
    }

    /// Id of the plugin providing `name`.
    pub async fn provider(&self, name: &str) -> Option<String> {
        self.providers.read().await.get(name).cloned()
    }

    /// Number of registered interfaces.
    pub async fn count(&self) -> usize {
        self.providers.read().await.len()
    }
}

/// Routes an interface call made on behalf of a plugin.
#[async_trait]
pub trait InterfaceBroker: Send + Sync + std::fmt::Debug {
    /// Calls `action` on the provider of `interface` as plugin `caller`.
    async fn call_interface(
        &self,
        caller: &str,
        interface: &str,
        action: &str,
        payload: Value,
    ) -> AppResult<Value>;
}

/// Resolves interface providers and dispatches actions to them.
#[derive(Debug)]
pub struct InterfaceRouter {
    /// Plugin records, for states, sandboxes and instances.
    registry: Arc<PluginRegistry>,
    /// Interface providers.
    interfaces: Arc<InterfaceRegistry>,
    /// Deadline for each `handle_action` call.
    timeout: Duration,
}

impl InterfaceRouter {
    /// Creates a router over `registry` and `interfaces`.
    pub fn new(
        registry: Arc<PluginRegistry>,
        interfaces: Arc<InterfaceRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            interfaces,
            timeout,
        }
    }

    /// Sends an action to an active plugin.
    pub async fn dispatch(&self, id: &str, action: &str, payload: Value) -> AppResult<Value> {
        match self.registry.state(id).await {
            Some(PluginState::Active) => {}
            Some(state) => {
                return Err(AppError::conflict(format!(
                    "Plugin '{id}' is not active ({state})"
                )));
            }
            None => return Err(AppError::not_found(format!("Plugin '{id}' is not registered"))),
        }

        let instance = self
            .registry
            .instance(id)
            .await
            .ok_or_else(|| AppError::internal(format!("Plugin '{id}' has no instance")))?;

        debug!(plugin_id = %id, action = %action, "Dispatching plugin action");
        run_guarded(id, "handle_action", self.timeout, instance.handle_action(action, payload))
            .await
    }
}

#[async_trait]
impl InterfaceBroker for InterfaceRouter {
    async fn call_interface(
        &self,
        caller: &str,
        interface: &str,
        action: &str,
        payload: Value,
    ) -> AppResult<Value> {
        match self.registry.state(caller).await {
            Some(PluginState::Active) => {}
            Some(state) => {
                return Err(AppError::conflict(format!(
                    "Plugin '{caller}' must be active to call interfaces ({state})"
                )));
            }
            None => {
                return Err(AppError::not_found(format!(
                    "Plugin '{caller}' is not loaded"
                )));
            }
        }

        let sandbox = self.registry.sandbox(caller).await.ok_or_else(|| {
            AppError::internal(format!("Plugin '{caller}' has no sandbox"))
        })?;

        if let Err(e) = sandbox.require_api(interface) {
            warn!(plugin_id = %caller, interface = %interface, "Interface call denied by sandbox");
            return Err(e);
        }

        let provider = self.interfaces.provider(interface).await.ok_or_else(|| {
            AppError::not_found(format!("No plugin provides interface '{interface}'"))
        })?;

        self.dispatch(&provider, action, payload).await
    }
}
