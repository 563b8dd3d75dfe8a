//! # plughost-plugin
//!
//! Plugin runtime for plughost. Provides:
//!
//! - Plugin records and the lifecycle state machine
//! - Dependency resolution with cycle and missing-dependency detection
//! - Capability sandbox (permission and API allowlist checks)
//! - Hook registry and a priority-ordered dispatcher threading a context
//! - Interface registry for plugin-to-plugin calls
//! - Lifecycle manager (load, activate, deactivate, unload, disable, fault)
//! - Directory discovery and a host that loads in dependency order
//! - Optional dynamic loading via `libloading` (`dynamic` feature)

pub mod api;
pub mod discovery;
pub mod hooks;
pub mod host;
pub mod interfaces;
pub mod loader;
pub mod macros;
pub mod manager;
pub mod metadata;
pub mod prelude;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod sandbox;
pub mod status;
pub mod traits;

pub use api::context::PluginContext;
pub use discovery::{DirectoryDiscovery, DiscoveryReport, PluginDiscovery, StaticDiscovery};
pub use hooks::{HookAction, HookContext, HookDispatcher, HookRegistry, HookResult, TriggerOptions};
pub use host::{PluginHost, PluginLoadResult};
pub use interfaces::{InterfaceBroker, InterfaceRegistry, InterfaceRouter};
pub use loader::{FactoryLoader, PluginFactory, PluginLoader};
pub use manager::LifecycleManager;
pub use metadata::{PluginMetadata, PluginSource};
pub use record::{PluginRecord, PluginState};
pub use registry::PluginRegistry;
pub use resolver::{DependencyResolver, Resolution};
pub use sandbox::Sandbox;
pub use status::{PluginInfo, StateCounts, SystemStatus};
pub use traits::{HookBinding, Plugin};
