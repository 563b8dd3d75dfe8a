//! The plugin trait and helpers for declaring hook handlers.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use plughost_core::{AppError, AppResult};

use crate::api::context::PluginContext;
use crate::hooks::definitions::{HookContext, HookResult};
use crate::hooks::registry::HookHandler;

/// Default subscription priority (lower runs first).
pub const DEFAULT_PRIORITY: i32 = 100;

/// Trait that all plugins must implement.
///
/// Every method has a no-op default, so a plugin only overrides the
/// lifecycle steps it cares about. Each call runs under the host's
/// lifecycle hook timeout.
#[async_trait]
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Called once while loading, after the sandbox exists.
    async fn init(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Called when the plugin becomes active. Dependencies are already active.
    async fn activate(&self) -> AppResult<()> {
        Ok(())
    }

    /// Called when the plugin is deactivated. Failures are logged, not fatal.
    async fn deactivate(&self) -> AppResult<()> {
        Ok(())
    }

    /// Called before the instance is dropped.
    async fn cleanup(&self) -> AppResult<()> {
        Ok(())
    }

    /// Handles an action sent by the host or by another plugin through an interface.
    async fn handle_action(&self, action: &str, _payload: Value) -> AppResult<Value> {
        Err(AppError::not_found(format!("Unsupported action '{action}'")))
    }

    /// Hook handlers to register once `init` succeeds.
    ///
    /// Every binding must target a hook declared in the plugin's metadata.
    fn hook_bindings(&self) -> Vec<HookBinding> {
        Vec::new()
    }
}

/// A handler bound to a hook name at a priority.
#[derive(Debug, Clone)]
pub struct HookBinding {
    /// Hook name.
    pub hook: String,
    /// Execution priority (lower = runs first).
    pub priority: i32,
    /// Handler invoked on trigger.
    pub handler: Arc<dyn HookHandler>,
}

impl HookBinding {
    /// Binds an existing handler.
    pub fn new(hook: &str, priority: i32, handler: Arc<dyn HookHandler>) -> Self {
        Self {
            hook: hook.to_string(),
            priority,
            handler,
        }
    }

    /// Binds a closure.
    pub fn closure<F, Fut>(hook: &str, priority: i32, handler: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HookResult> + Send + 'static,
    {
        Self::new(hook, priority, Arc::new(ClosureHandler::new(handler)))
    }
}

/// A closure-based hook handler for quick handler creation.
pub struct ClosureHandler {
    /// Handler function.
    handler: Arc<dyn Fn(HookContext) -> BoxFuture<'static, HookResult> + Send + Sync>,
}

impl std::fmt::Debug for ClosureHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureHandler")
            .field("handler", &"<closure>")
            .finish()
    }
}

impl ClosureHandler {
    /// Creates a new closure-based handler. The closure receives an owned copy of the context.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HookResult> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |context| handler(context).boxed()),
        }
    }
}

#[async_trait]
impl HookHandler for ClosureHandler {
    async fn handle(&self, context: &HookContext) -> HookResult {
        (self.handler)(context.clone()).await
    }
}
