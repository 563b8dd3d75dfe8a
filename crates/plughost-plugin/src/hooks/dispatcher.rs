//! Hook dispatcher — fans a context out through a hook's subscribers.
//!
//! - Subscribers are visited in ascending priority, ties in registration order.
//! - Only subscribers whose owner is currently active are invoked; the check
//!   is re-read before every handler, so an owner that leaves the active set
//!   mid-dispatch is skipped from then on without interrupting the chain.
//! - A handler may replace the context; the replacement feeds the next handler.
//! - A failing, timed-out, or panicking handler is logged and skipped, unless
//!   the caller asked for `stop_on_error`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use plughost_core::config::HookConfig;
use plughost_core::{AppError, AppResult, ErrorKind};

use super::definitions::{HookAction, HookContext, TriggerOptions};
use super::registry::{HookRegistry, HookSubscription};

/// Answers whether a subscription owner may currently receive hook calls.
#[async_trait]
pub trait OwnerActivity: Send + Sync + std::fmt::Debug {
    /// Returns `true` if handlers owned by `owner_id` should run.
    async fn is_active(&self, owner_id: &str) -> bool;
}

/// Dispatches hooks to all registered handlers.
#[derive(Debug)]
pub struct HookDispatcher {
    /// Hook registry.
    registry: Arc<HookRegistry>,
    /// Source of truth for which owners are active.
    activity: Arc<dyn OwnerActivity>,
    /// Defaults applied when a trigger passes no explicit timeout.
    defaults: HookConfig,
}

impl HookDispatcher {
    /// Creates a new hook dispatcher.
    pub fn new(
        registry: Arc<HookRegistry>,
        activity: Arc<dyn OwnerActivity>,
        defaults: HookConfig,
    ) -> Self {
        Self {
            registry,
            activity,
            defaults,
        }
    }

    /// Trigger options built from the configured defaults.
    pub fn default_options(&self) -> TriggerOptions {
        TriggerOptions::from(&self.defaults)
    }

    /// Fires `hook`, threading `context` through every active subscriber.
    ///
    /// With no subscribers the context is returned unchanged. Returns the
    /// final context, or the first handler error when `stop_on_error` is set.
    pub async fn trigger(
        &self,
        hook: &str,
        context: HookContext,
        options: TriggerOptions,
    ) -> AppResult<HookContext> {
        let subscriptions = self.registry.subscribers(hook).await;

        if subscriptions.is_empty() {
            return Ok(context);
        }

        let trigger_id = Uuid::new_v4();
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.defaults.handler_timeout());

        debug!(
            hook = %hook,
            trigger_id = %trigger_id,
            handler_count = subscriptions.len(),
            "Dispatching hook"
        );

        let mut current = context;

        for subscription in &subscriptions {
            if !self.activity.is_active(&subscription.owner_id).await {
                debug!(
                    hook = %hook,
                    trigger_id = %trigger_id,
                    plugin_id = %subscription.owner_id,
                    "Skipping handler of inactive plugin"
                );
                continue;
            }

            match self.invoke(subscription, &current, timeout).await {
                Ok(HookAction::Continue) => {
                    debug!(
                        hook = %hook,
                        trigger_id = %trigger_id,
                        plugin_id = %subscription.owner_id,
                        "Handler returned Continue"
                    );
                }
                Ok(HookAction::Replace(next)) => {
                    debug!(
                        hook = %hook,
                        trigger_id = %trigger_id,
                        plugin_id = %subscription.owner_id,
                        keys = next.len(),
                        "Handler replaced context"
                    );
                    current = next;
                }
                Err(e) if options.stop_on_error => {
                    error!(
                        hook = %hook,
                        trigger_id = %trigger_id,
                        plugin_id = %subscription.owner_id,
                        error = %e,
                        "Hook handler failed, aborting chain"
                    );
                    return Err(AppError::with_source(
                        ErrorKind::HookFailure,
                        format!(
                            "Handler of plugin '{}' failed on hook '{}': {}",
                            subscription.owner_id, hook, e.message
                        ),
                        e,
                    ));
                }
                Err(e) => {
                    warn!(
                        hook = %hook,
                        trigger_id = %trigger_id,
                        plugin_id = %subscription.owner_id,
                        error = %e,
                        "Hook handler failed, continuing"
                    );
                }
            }
        }

        Ok(current)
    }

    /// Runs one handler under the deadline, folding timeouts and panics into errors.
    async fn invoke(
        &self,
        subscription: &HookSubscription,
        context: &HookContext,
        timeout: std::time::Duration,
    ) -> AppResult<HookAction> {
        let call = AssertUnwindSafe(subscription.handler.handle(context)).catch_unwind();

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AppError::hook_failure(format!(
                "Handler of plugin '{}' panicked",
                subscription.owner_id
            ))),
            Err(_) => Err(AppError::hook_failure(format!(
                "Handler of plugin '{}' timed out after {}ms",
                subscription.owner_id,
                timeout.as_millis()
            ))),
        }
    }

    /// Returns a reference to the hook registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }
}
