//! Lifecycle manager — drives plugins through their state machine.
//!
//! Transitions are serialised per plugin id with an async mutex; unrelated
//! ids proceed concurrently. Recursive activation and deactivation visit the
//! other plugins *before* taking their own lock, and the only nested
//! acquisition is a dependency's lock held while a dependent's is taken, so
//! lock order always follows the dependency graph.
//!
//! Every call into plugin code runs under the lifecycle hook timeout with
//! panics caught; a timeout or panic is a `LifecycleHookFailure`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use plughost_core::config::{LifecycleConfig, SandboxConfig};
use plughost_core::{AppError, AppResult, ErrorKind, HostConfig};

use crate::api::context::PluginContext;
use crate::hooks::definitions::{HookContext, TriggerOptions};
use crate::hooks::dispatcher::HookDispatcher;
use crate::hooks::registry::HookRegistry;
use crate::interfaces::{InterfaceBroker, InterfaceRegistry, InterfaceRouter};
use crate::loader::PluginLoader;
use crate::metadata::PluginSource;
use crate::record::PluginState;
use crate::registry::PluginRegistry;
use crate::sandbox::Sandbox;
use crate::status::{PluginInfo, SystemStatus};
use crate::traits::Plugin;

/// Manages the full lifecycle of plugins: load, activate, deactivate, unload.
#[derive(Debug)]
pub struct LifecycleManager {
    /// Plugin records.
    registry: Arc<PluginRegistry>,
    /// Hook subscriptions.
    hooks: Arc<HookRegistry>,
    /// Hook dispatcher.
    dispatcher: Arc<HookDispatcher>,
    /// Interface providers.
    interfaces: Arc<InterfaceRegistry>,
    /// Plugin-to-plugin and external action routing.
    router: Arc<InterfaceRouter>,
    /// Instantiation strategy.
    loader: Arc<dyn PluginLoader>,
    /// Plugin ID → transition lock.
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Lifecycle timeouts.
    lifecycle: LifecycleConfig,
    /// Host-wide permission grant policy.
    sandbox_policy: SandboxConfig,
}

impl LifecycleManager {
    /// Creates a lifecycle manager over `registry`.
    pub fn new(
        registry: Arc<PluginRegistry>,
        loader: Arc<dyn PluginLoader>,
        config: &HostConfig,
    ) -> Self {
        let hooks = Arc::new(HookRegistry::new());
        let dispatcher = Arc::new(HookDispatcher::new(
            hooks.clone(),
            registry.clone(),
            config.hooks.clone(),
        ));

        let interfaces = Arc::new(InterfaceRegistry::new());
        let router = Arc::new(InterfaceRouter::new(
            registry.clone(),
            interfaces.clone(),
            config.lifecycle.hook_timeout(),
        ));

        Self {
            registry,
            hooks,
            dispatcher,
            interfaces,
            router,
            loader,
            locks: DashMap::new(),
            lifecycle: config.lifecycle.clone(),
            sandbox_policy: config.sandbox.clone(),
        }
    }

    /// Loads `source` into `Loaded`.
    ///
    /// An id that is already registered is a `Conflict` unless `force` is
    /// set. With `force`, a `Loaded` plugin is unloaded and loaded again, and
    /// an `Error` or `Disabled` record is re-armed in place. Active plugins
    /// must be deactivated first. On failure the record is kept in `Error`.
    pub async fn load(&self, source: PluginSource, force: bool) -> AppResult<()> {
        let id = source.id.clone();
        let _guard = self.lock(&id).await;

        match self.registry.state(&id).await {
            None => {}
            Some(state) if !force => {
                return Err(AppError::conflict(format!(
                    "Plugin '{id}' is already registered ({state})"
                )));
            }
            Some(PluginState::Loaded) => {
                self.registry.ensure_removable(&id).await?;
                self.teardown(&id).await;
                self.registry.remove(&id).await?;
                debug!(plugin_id = %id, "Dropped loaded plugin for forced reload");
            }
            Some(PluginState::Error | PluginState::Disabled) => {}
            Some(state) => {
                return Err(AppError::invalid_transition(format!(
                    "Plugin '{id}' cannot be reloaded while {state}"
                )));
            }
        }

        if let Some(cycle) = self.registry.find_cycle(&id, source.dependencies()).await {
            return Err(AppError::circular_dependency(format!(
                "Loading plugin '{id}' would create a dependency cycle: {}",
                cycle.join(" -> ")
            )));
        }

        self.registry.begin_loading(source.clone()).await?;
        info!(
            plugin_id = %id,
            name = %source.metadata.name,
            version = %source.metadata.version,
            "Loading plugin"
        );

        match self.complete_load(&source).await {
            Ok(()) => {
                self.registry.transition(&id, PluginState::Loaded).await?;
                info!(
                    plugin_id = %id,
                    hooks = self.hooks.hooks_for(&id).await.len(),
                    "Plugin loaded"
                );
                Ok(())
            }
            Err(e) => {
                error!(plugin_id = %id, error = %e, "Plugin failed to load");
                self.hooks.unregister_all(&id).await;
                self.interfaces.unregister_all(&id).await;
                self.registry
                    .park(&id, PluginState::Error, Some(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    /// Steps between `Loading` and `Loaded`; the caller handles failure.
    async fn complete_load(&self, source: &PluginSource) -> AppResult<()> {
        let id = source.id.as_str();
        source.metadata.validate(id)?;

        for dep in source.dependencies() {
            match self.registry.state(dep).await {
                Some(state) if state.satisfies_dependency() => {}
                Some(state) => {
                    return Err(AppError::missing_dependency(format!(
                        "Plugin '{id}' requires '{dep}', which is {state}"
                    )));
                }
                None => {
                    return Err(AppError::missing_dependency(format!(
                        "Plugin '{id}' requires '{dep}', which is not loaded"
                    )));
                }
            }
        }

        let sandbox = Arc::new(Sandbox::create(
            id,
            &source.metadata,
            &self.sandbox_policy,
        )?);
        let instance = self.loader.instantiate(source)?;

        let ctx = PluginContext::new(
            id,
            &source.location,
            sandbox.clone(),
            self.dispatcher.clone(),
            self.router.clone(),
        );
        self.invoke(id, "init", instance.init(&ctx)).await?;

        if let Err(e) = self.wire(source, instance.as_ref()).await {
            if let Err(cleanup) = self.invoke(id, "cleanup", instance.cleanup()).await {
                warn!(plugin_id = %id, error = %cleanup, "Cleanup after failed load returned error");
            }
            return Err(e);
        }

        self.registry.attach(id, instance, sandbox).await
    }

    /// Registers the instance's hook bindings and the declared interfaces.
    async fn wire(&self, source: &PluginSource, instance: &dyn Plugin) -> AppResult<()> {
        let id = source.id.as_str();
        let bindings = instance.hook_bindings();

        if let Some(binding) = bindings
            .iter()
            .find(|b| !source.metadata.declares_hook(&b.hook))
        {
            return Err(AppError::validation(format!(
                "Plugin '{id}' binds hook '{}', which its metadata does not declare",
                binding.hook
            )));
        }

        for binding in bindings {
            self.hooks
                .register_hook(&binding.hook, binding.handler, id, binding.priority)
                .await;
        }

        for name in &source.metadata.interfaces {
            self.interfaces.register(name, id).await?;
        }

        Ok(())
    }

    /// Activates `id`, activating its dependencies first.
    ///
    /// Already active plugins are left alone. If the plugin's `activate`
    /// fails it moves to `Error`.
    pub fn activate<'a>(&'a self, id: &'a str) -> BoxFuture<'a, AppResult<()>> {
        async move {
            let deps = match self.registry.state(id).await {
                Some(PluginState::Active) => return Ok(()),
                Some(PluginState::Loaded) => self.registry.dependencies(id).await,
                Some(state) => return Err(cannot(id, "activate", state)),
                None => return Err(not_registered(id)),
            };

            for dep in &deps {
                match self.registry.state(dep).await {
                    Some(state) if state.satisfies_dependency() => {}
                    state => {
                        return Err(AppError::missing_dependency(format!(
                            "Plugin '{id}' cannot activate: dependency '{dep}' is {}",
                            state.map(|s| s.to_string()).unwrap_or_else(|| "absent".into())
                        )));
                    }
                }
                self.activate(dep).await.map_err(|e| {
                    AppError::new(
                        e.kind,
                        format!("Plugin '{id}' cannot activate: dependency '{dep}' failed: {}", e.message),
                    )
                })?;
            }

            let _guard = self.lock(id).await;

            match self.registry.state(id).await {
                Some(PluginState::Active) => return Ok(()),
                Some(PluginState::Loaded) => {}
                Some(state) => return Err(cannot(id, "activate", state)),
                None => return Err(not_registered(id)),
            }
            for dep in &deps {
                if self.registry.state(dep).await != Some(PluginState::Active) {
                    return Err(AppError::conflict(format!(
                        "Dependency '{dep}' of plugin '{id}' was deactivated during activation"
                    )));
                }
            }

            let instance = self.instance(id).await?;
            self.registry.transition(id, PluginState::Active).await?;

            match self.invoke(id, "activate", instance.activate()).await {
                Ok(()) => {
                    info!(plugin_id = %id, "Plugin activated");
                    Ok(())
                }
                Err(e) => {
                    error!(plugin_id = %id, error = %e, "Plugin failed to activate");
                    self.fail_active(id, &e.to_string()).await?;
                    Err(e)
                }
            }
        }
        .boxed()
    }

    /// Deactivates `id`, deactivating its active dependents first.
    ///
    /// A `Loaded` plugin is left alone. A failing `deactivate` is logged and
    /// the plugin still returns to `Loaded`.
    pub fn deactivate<'a>(&'a self, id: &'a str) -> BoxFuture<'a, AppResult<()>> {
        async move {
            match self.registry.state(id).await {
                Some(PluginState::Active) => {}
                Some(PluginState::Loaded) => return Ok(()),
                Some(state) => return Err(cannot(id, "deactivate", state)),
                None => return Err(not_registered(id)),
            }

            for dependent in self.registry.active_dependents(id).await {
                self.deactivate(&dependent).await?;
            }

            let _guard = self.lock(id).await;

            match self.registry.state(id).await {
                Some(PluginState::Active) => {}
                Some(PluginState::Loaded) => return Ok(()),
                Some(state) => return Err(cannot(id, "deactivate", state)),
                None => return Err(not_registered(id)),
            }
            let still_active = self.registry.active_dependents(id).await;
            if !still_active.is_empty() {
                return Err(AppError::conflict(format!(
                    "Plugin '{id}' gained active dependents during deactivation: {}",
                    still_active.join(", ")
                )));
            }

            let instance = self.instance(id).await?;
            self.registry.transition(id, PluginState::Loaded).await?;

            if let Err(e) = self.invoke(id, "deactivate", instance.deactivate()).await {
                warn!(plugin_id = %id, error = %e, "Plugin deactivate returned error");
            }

            info!(plugin_id = %id, "Plugin deactivated");
            Ok(())
        }
        .boxed()
    }

    /// Unloads `id`, deactivating it first if needed.
    ///
    /// Fails with `UnloadBlocked`, before anything changes, while other
    /// plugins depend on it.
    pub async fn unload(&self, id: &str) -> AppResult<()> {
        self.registry.ensure_removable(id).await?;

        if self.registry.state(id).await == Some(PluginState::Active) {
            self.deactivate(id).await?;
        }

        let _guard = self.lock(id).await;

        match self.registry.state(id).await {
            Some(PluginState::Loaded | PluginState::Error | PluginState::Disabled) => {}
            Some(state) => return Err(cannot(id, "unload", state)),
            None => return Err(not_registered(id)),
        }
        self.registry.ensure_removable(id).await?;

        self.teardown(id).await;
        self.registry.remove(id).await?;
        // Only the table and this guard hold the mutex; waiters keep it alive.
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) <= 2);

        info!(plugin_id = %id, "Plugin unloaded");
        Ok(())
    }

    /// Disables `id`: deactivates it, tears it down, and keeps the record
    /// so discovery does not load it again.
    pub async fn disable(&self, id: &str) -> AppResult<()> {
        match self.registry.state(id).await {
            Some(PluginState::Disabled) => return Ok(()),
            Some(PluginState::Active) => self.deactivate(id).await?,
            Some(_) => {}
            None => return Err(not_registered(id)),
        }

        let _guard = self.lock(id).await;

        match self.registry.state(id).await {
            Some(PluginState::Disabled) => return Ok(()),
            Some(PluginState::Active) => {
                return Err(AppError::conflict(format!(
                    "Plugin '{id}' was re-activated while being disabled"
                )));
            }
            Some(_) => {}
            None => return Err(not_registered(id)),
        }

        self.teardown(id).await;
        self.registry.park(id, PluginState::Disabled, None).await?;

        info!(plugin_id = %id, "Plugin disabled");
        Ok(())
    }

    /// Re-enables a disabled plugin by loading it again from its retained source.
    pub async fn enable(&self, id: &str) -> AppResult<()> {
        let source = match self.registry.state(id).await {
            Some(PluginState::Disabled) => self
                .registry
                .source(id)
                .await
                .ok_or_else(|| not_registered(id))?,
            Some(state) => return Err(cannot(id, "enable", state)),
            None => return Err(not_registered(id)),
        };

        info!(plugin_id = %id, "Enabling plugin");
        self.load(source, true).await
    }

    /// Reports a runtime fault of an active plugin.
    ///
    /// Active dependents are deactivated first, then the plugin is torn down
    /// and moved to `Error`. Its `deactivate` is not called; `cleanup` is.
    pub async fn fault(&self, id: &str, reason: &str) -> AppResult<()> {
        let _guard = self.lock(id).await;

        match self.registry.state(id).await {
            Some(PluginState::Active) => {}
            Some(state) => return Err(cannot(id, "fault", state)),
            None => return Err(not_registered(id)),
        }

        error!(plugin_id = %id, reason = %reason, "Plugin reported a runtime fault");
        self.fail_active(id, reason).await
    }

    /// Unloads every plugin, dependents before their dependencies.
    pub async fn unload_all(&self) -> AppResult<()> {
        loop {
            let ids = self.registry.ids().await;
            if ids.is_empty() {
                break;
            }

            let mut progressed = false;
            for id in &ids {
                if !self.registry.dependents(id).await.is_empty() {
                    continue;
                }
                match self.unload(id).await {
                    Ok(()) => progressed = true,
                    Err(e) if e.is(ErrorKind::NotFound) => progressed = true,
                    Err(e) => error!(plugin_id = %id, error = %e, "Error unloading plugin"),
                }
            }

            if !progressed {
                let remaining = self.registry.ids().await;
                return Err(AppError::internal(format!(
                    "Could not unload plugins: {}",
                    remaining.join(", ")
                )));
            }
        }

        info!("All plugins unloaded");
        Ok(())
    }

    /// Fires `hook` through the dispatcher.
    pub async fn trigger(
        &self,
        hook: &str,
        context: HookContext,
        options: TriggerOptions,
    ) -> AppResult<HookContext> {
        self.dispatcher.trigger(hook, context, options).await
    }

    /// Sends an action to an active plugin.
    pub async fn handle_action(&self, id: &str, action: &str, payload: Value) -> AppResult<Value> {
        self.router.dispatch(id, action, payload).await
    }

    /// Calls `interface` on behalf of plugin `caller`.
    ///
    /// The caller must be active and its sandbox must allow the interface;
    /// the call is routed to the provider's `handle_action`. Plugins make the
    /// same call through [`PluginContext::call_interface`].
    pub async fn call_interface(
        &self,
        caller: &str,
        interface: &str,
        action: &str,
        payload: Value,
    ) -> AppResult<Value> {
        self.router
            .call_interface(caller, interface, action, payload)
            .await
    }

    /// Host-wide status snapshot.
    pub async fn status(&self) -> SystemStatus {
        SystemStatus {
            total: self.registry.count().await,
            states: self.registry.state_counts().await,
            hook_count: self.hooks.hook_names().await.len(),
            subscription_count: self.hooks.subscription_count().await,
            interface_count: self.interfaces.count().await,
        }
    }

    /// Snapshot of one plugin.
    pub async fn plugin_info(&self, id: &str) -> AppResult<PluginInfo> {
        self.registry.info(id).await.ok_or_else(|| not_registered(id))
    }

    /// Snapshots of every plugin, sorted by id.
    pub async fn list_plugins(&self) -> Vec<PluginInfo> {
        self.registry.list().await
    }

    /// Returns the plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Returns the hook registry.
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Returns the hook dispatcher for firing hooks.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    /// Returns the interface registry.
    pub fn interfaces(&self) -> &Arc<InterfaceRegistry> {
        &self.interfaces
    }

    async fn lock(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(id.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    async fn instance(&self, id: &str) -> AppResult<Arc<dyn Plugin>> {
        self.registry
            .instance(id)
            .await
            .ok_or_else(|| AppError::internal(format!("Plugin '{id}' has no instance")))
    }

    /// Moves an active plugin to `Error`, deactivating its active dependents first.
    ///
    /// Called with the plugin's lock held.
    async fn fail_active(&self, id: &str, reason: &str) -> AppResult<()> {
        for dependent in self.registry.active_dependents(id).await {
            if let Err(e) = self.deactivate(&dependent).await {
                warn!(
                    plugin_id = %id,
                    dependent = %dependent,
                    error = %e,
                    "Failed to deactivate dependent of faulted plugin"
                );
            }
        }

        self.teardown(id).await;
        self.registry
            .park(id, PluginState::Error, Some(reason.to_string()))
            .await?;
        Ok(())
    }

    /// Unregisters hooks and interfaces, then runs `cleanup` and drops the instance.
    async fn teardown(&self, id: &str) {
        let hooks = self.hooks.unregister_all(id).await;
        let interfaces = self.interfaces.unregister_all(id).await;

        if let Some(instance) = self.registry.detach(id).await {
            if let Err(e) = self.invoke(id, "cleanup", instance.cleanup()).await {
                warn!(plugin_id = %id, error = %e, "Plugin cleanup returned error");
            }
        }

        debug!(plugin_id = %id, hooks, interfaces, "Plugin torn down");
    }

    /// Runs a lifecycle hook; any failure becomes `LifecycleHookFailure`.
    async fn invoke<F>(&self, id: &str, step: &str, call: F) -> AppResult<()>
    where
        F: Future<Output = AppResult<()>>,
    {
        match self.guarded(id, step, call).await {
            Err(e) if !e.is(ErrorKind::LifecycleHookFailure) => Err(AppError::with_source(
                ErrorKind::LifecycleHookFailure,
                format!("Plugin '{id}' failed in {step}: {}", e.message),
                e,
            )),
            result => result,
        }
    }

    /// Runs plugin code under the hook timeout, folding panics and timeouts into errors.
    async fn guarded<T, F>(&self, id: &str, step: &str, call: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        run_guarded(id, step, self.lifecycle.hook_timeout(), call).await
    }
}

/// Runs plugin code under `timeout`, folding panics and timeouts into
/// `LifecycleHookFailure`.
pub(crate) async fn run_guarded<T, F>(
    id: &str,
    step: &str,
    timeout: Duration,
    call: F,
) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(AppError::lifecycle_hook(format!(
            "Plugin '{id}' panicked in {step}"
        ))),
        Err(_) => Err(AppError::lifecycle_hook(format!(
            "Plugin '{id}' timed out in {step} after {}ms",
            timeout.as_millis()
        ))),
    }
}

fn not_registered(id: &str) -> AppError {
    AppError::not_found(format!("Plugin '{id}' is not registered"))
}

fn cannot(id: &str, action: &str, state: PluginState) -> AppError {
    AppError::invalid_transition(format!("Cannot {action} plugin '{id}' while {state}"))
}
