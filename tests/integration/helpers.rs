//! Shared test helpers for integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use plughost_core::{AppError, AppResult, HostConfig};
use plughost_plugin::discovery::PluginDiscovery;
use plughost_plugin::hooks::{HookAction, HookContext};
use plughost_plugin::loader::FactoryLoader;
use plughost_plugin::traits::{DEFAULT_PRIORITY, HookBinding, Plugin};
use plughost_plugin::{
    LifecycleManager, PluginContext, PluginHost, PluginMetadata, PluginRegistry, PluginSource,
};

/// Main-entry reference served by [`TestPlugin`].
pub const TEST_MAIN: &str = "test";

/// Context key every test handler appends its plugin id to.
pub const TRACE_KEY: &str = "trace";

/// Context key holding an interface reply.
pub const REPLY_KEY: &str = "reply";

/// Context key holding the kind of a refused interface call.
pub const REPLY_ERROR_KEY: &str = "reply_error";

/// Ordered record of lifecycle and handler calls across all test plugins.
#[derive(Debug, Default)]
pub struct CallLog(Mutex<Vec<String>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    /// Entries so far.
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries starting with `prefix`, in call order.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// How a [`TestPlugin`] misbehaves.
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Priority of every hook binding.
    pub priority: i32,
    /// `activate` returns an error.
    pub fail_activate: bool,
    /// Hook handlers return an error.
    pub fail_handler: bool,
    /// Hook handlers never finish.
    pub hang_handler: bool,
    /// Bind this hook in addition to the declared ones.
    pub extra_hook: Option<String>,
    /// Handlers call `echo` on this interface instead of tracing.
    pub call_interface: Option<String>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            fail_activate: false,
            fail_handler: false,
            hang_handler: false,
            extra_hook: None,
            call_interface: None,
        }
    }
}

impl Behavior {
    pub fn priority(priority: i32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// Plugin that logs its lifecycle and binds a tracing handler to every declared hook.
#[derive(Debug)]
pub struct TestPlugin {
    id: String,
    hooks: Vec<String>,
    behavior: Behavior,
    calls: Arc<CallLog>,
    context: Arc<OnceLock<PluginContext>>,
}

#[async_trait]
impl Plugin for TestPlugin {
    async fn init(&self, ctx: &PluginContext) -> AppResult<()> {
        let _ = self.context.set(ctx.clone());
        Ok(())
    }

    async fn activate(&self) -> AppResult<()> {
        self.calls.push(format!("activate:{}", self.id));
        if self.behavior.fail_activate {
            return Err(AppError::internal(format!("{} refused to activate", self.id)));
        }
        Ok(())
    }

    async fn deactivate(&self) -> AppResult<()> {
        self.calls.push(format!("deactivate:{}", self.id));
        Ok(())
    }

    async fn cleanup(&self) -> AppResult<()> {
        self.calls.push(format!("cleanup:{}", self.id));
        Ok(())
    }

    async fn handle_action(&self, action: &str, payload: Value) -> AppResult<Value> {
        match action {
            "echo" => Ok(json!({ "from": self.id, "payload": payload })),
            other => Err(AppError::not_found(format!("Unsupported action '{other}'"))),
        }
    }

    fn hook_bindings(&self) -> Vec<HookBinding> {
        self.hooks
            .iter()
            .chain(self.behavior.extra_hook.iter())
            .map(|hook| self.binding(hook))
            .collect()
    }
}

impl TestPlugin {
    fn binding(&self, hook: &str) -> HookBinding {
        let id = self.id.clone();
        let hook_name = hook.to_string();
        let calls = self.calls.clone();
        let behavior = self.behavior.clone();
        let context = self.context.clone();

        HookBinding::closure(hook, behavior.priority, move |ctx: HookContext| {
            let id = id.clone();
            let hook_name = hook_name.clone();
            let calls = calls.clone();
            let behavior = behavior.clone();
            let context = context.clone();

            async move {
                calls.push(format!("hook:{id}:{hook_name}"));
                if behavior.hang_handler {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                if behavior.fail_handler {
                    return Err(AppError::internal(format!("{id} handler failed")));
                }
                if let Some(interface) = &behavior.call_interface {
                    let host = context
                        .get()
                        .ok_or_else(|| AppError::internal(format!("{id} was not initialised")))?;
                    return Ok(HookAction::Replace(
                        call_echo(host, interface, ctx, &id).await,
                    ));
                }
                Ok(HookAction::Replace(append_trace(ctx, &id)))
            }
        })
    }
}

async fn call_echo(
    host: &PluginContext,
    interface: &str,
    mut ctx: HookContext,
    id: &str,
) -> HookContext {
    match host.call_interface(interface, "echo", json!(id)).await {
        Ok(reply) => {
            ctx.insert(REPLY_KEY, reply);
        }
        Err(e) => {
            ctx.insert(REPLY_ERROR_KEY, json!(format!("{:?}", e.kind)));
        }
    }
    ctx
}

fn append_trace(mut ctx: HookContext, id: &str) -> HookContext {
    let mut trace = ctx
        .get(TRACE_KEY)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    trace.push(json!(id));
    ctx.insert(TRACE_KEY, Value::Array(trace));
    ctx
}

/// Plugin ids a handler chain visited, in order.
pub fn trace(ctx: &HookContext) -> Vec<String> {
    ctx.get(TRACE_KEY)
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Metadata served by [`TestPlugin`].
pub fn meta(id: &str) -> PluginMetadata {
    PluginMetadata::new(id, "1.0.0", TEST_MAIN)
}

/// A compiled-in test source with dependencies and hooks.
pub fn source(id: &str, deps: &[&str], hooks: &[&str]) -> PluginSource {
    let metadata = deps.iter().fold(meta(id), |m, d| m.with_dependency(d));
    let metadata = hooks.iter().fold(metadata, |m, h| m.with_hook(h));
    PluginSource::builtin(id, metadata)
}

/// A wired lifecycle manager with the test and event-log factories.
pub struct TestApp {
    pub lifecycle: Arc<LifecycleManager>,
    pub calls: Arc<CallLog>,
    pub config: HostConfig,
}

impl TestApp {
    /// Create a test app with the default configuration
    pub fn new() -> Self {
        Self::with(HostConfig::default(), HashMap::new())
    }

    /// Create a test app with per-plugin behaviors
    pub fn with_behaviors(behaviors: &[(&str, Behavior)]) -> Self {
        let behaviors = behaviors
            .iter()
            .map(|(id, b)| (id.to_string(), b.clone()))
            .collect();
        Self::with(HostConfig::default(), behaviors)
    }

    /// Create a test app
    pub fn with(config: HostConfig, behaviors: HashMap<String, Behavior>) -> Self {
        let calls = Arc::new(CallLog::default());
        let mut loader = FactoryLoader::new();

        let factory_calls = calls.clone();
        loader.register(TEST_MAIN, move |source: &PluginSource| {
            Ok(Arc::new(TestPlugin {
                id: source.id.clone(),
                hooks: source.metadata.hooks.clone(),
                behavior: behaviors.get(&source.id).cloned().unwrap_or_default(),
                calls: factory_calls.clone(),
                context: Arc::new(OnceLock::new()),
            }) as Arc<dyn Plugin>)
        });
        plugin_event_log::register(&mut loader);

        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::new(PluginRegistry::new()),
            Arc::new(loader),
            &config,
        ));

        Self {
            lifecycle,
            calls,
            config,
        }
    }

    /// A host over this app's lifecycle manager
    pub fn host(&self, discovery: Arc<dyn PluginDiscovery>) -> PluginHost {
        PluginHost::new(self.lifecycle.clone(), discovery, &self.config)
    }

    /// Load every source in order
    pub async fn load(&self, sources: Vec<PluginSource>) {
        for source in sources {
            let id = source.id.clone();
            self.lifecycle
                .load(source, false)
                .await
                .unwrap_or_else(|e| panic!("loading '{id}' failed: {e}"));
        }
    }
}
