//! Hook registry — subscriptions keyed by hook name with priority ordering.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::definitions::{HookContext, HookResult};

/// Trait for hook handler implementations.
#[async_trait]
pub trait HookHandler: Send + Sync + std::fmt::Debug {
    /// Handles a hook invocation.
    async fn handle(&self, context: &HookContext) -> HookResult;
}

/// One subscription of a plugin's handler to a named hook.
#[derive(Debug, Clone)]
pub struct HookSubscription {
    /// Hook name.
    pub hook: String,
    /// Plugin that registered this handler.
    pub owner_id: String,
    /// Priority (lower = earlier execution).
    pub priority: i32,
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
}

impl HookSubscription {
    fn is_same(&self, owner_id: &str, handler: &Arc<dyn HookHandler>) -> bool {
        self.owner_id == owner_id && Arc::ptr_eq(&self.handler, handler)
    }
}

/// Registry of hook subscriptions organized by hook name.
///
/// Each list is kept sorted by ascending priority; the sort is stable so
/// equal priorities keep registration order.
#[derive(Debug)]
pub struct HookRegistry {
    /// Hook name → sorted list of subscriptions.
    handlers: RwLock<HashMap<String, Vec<HookSubscription>>>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a handler for a hook.
    ///
    /// Registering the same handler (by `Arc` identity) for the same owner and
    /// hook twice is a no-op. Returns whether a subscription was added.
    pub async fn register_hook(
        &self,
        hook: &str,
        handler: Arc<dyn HookHandler>,
        owner_id: &str,
        priority: i32,
    ) -> bool {
        let mut handlers = self.handlers.write().await;
        let entries = handlers.entry(hook.to_string()).or_default();

        if entries.iter().any(|e| e.is_same(owner_id, &handler)) {
            debug!(hook = %hook, plugin_id = %owner_id, "Hook handler already registered");
            return false;
        }

        entries.push(HookSubscription {
            hook: hook.to_string(),
            owner_id: owner_id.to_string(),
            priority,
            handler,
        });

        // Sort by priority (lower first)
        entries.sort_by_key(|e| e.priority);

        info!(
            hook = %hook,
            plugin_id = %owner_id,
            priority = priority,
            "Hook handler registered"
        );

        true
    }

    /// Unregisters all handlers owned by a plugin. Returns how many were removed.
    pub async fn unregister_all(&self, owner_id: &str) -> usize {
        let mut handlers = self.handlers.write().await;
        let mut removed = 0;

        for entries in handlers.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.owner_id != owner_id);
            removed += before - entries.len();
        }

        // Remove empty hook entries
        handlers.retain(|_, entries| !entries.is_empty());

        if removed > 0 {
            info!(plugin_id = %owner_id, removed = removed, "All hooks unregistered for plugin");
        }

        removed
    }

    /// Returns a snapshot of the subscriptions for a hook, sorted by priority.
    pub async fn subscribers(&self, hook: &str) -> Vec<HookSubscription> {
        let handlers = self.handlers.read().await;
        handlers.get(hook).cloned().unwrap_or_default()
    }

    /// Returns whether any handlers are registered for a hook.
    pub async fn has_subscribers(&self, hook: &str) -> bool {
        let handlers = self.handlers.read().await;
        handlers
            .get(hook)
            .map(|entries| !entries.is_empty())
            .unwrap_or(false)
    }

    /// Returns the number of handlers registered for a hook.
    pub async fn subscriber_count(&self, hook: &str) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(hook).map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns all hook names with at least one subscription, sorted.
    pub async fn hook_names(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the total number of subscriptions across all hooks.
    pub async fn subscription_count(&self) -> usize {
        let handlers = self.handlers.read().await;
        handlers.values().map(Vec::len).sum()
    }

    /// Returns the hook names a given owner is subscribed to, sorted.
    pub async fn hooks_for(&self, owner_id: &str) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut names: Vec<String> = handlers
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.owner_id == owner_id))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
