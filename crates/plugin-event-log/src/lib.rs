//! Event journal plugin for plughost.
//!
//! Subscribes to `plugin.event`, keeps a bounded in-memory journal of what it
//! saw, and exposes the journal through the `event_log` interface. When it
//! holds the `hooks.trigger` permission it announces each entry on
//! `event_log.recorded`.

pub mod hooks;
pub mod journal;
pub mod plugin;

use std::sync::Arc;

use plughost_plugin::loader::FactoryLoader;
use plughost_plugin::prelude::*;

pub use journal::{EventJournal, JournalEntry};
pub use plugin::EventLogPlugin;

/// Main-entry reference the factory is registered under.
pub const MAIN: &str = "event-log";

/// Hook the plugin records.
pub const HOOK_EVENT: &str = "plugin.event";

/// Hook fired after an entry is recorded.
pub const HOOK_RECORDED: &str = "event_log.recorded";

/// Interface exposing the journal.
pub const INTERFACE: &str = "event_log";

/// Metadata matching what the plugin binds and provides.
pub fn metadata() -> PluginMetadata {
    plugin_metadata!(
        name: "Event Log",
        version: env!("CARGO_PKG_VERSION"),
        main: MAIN,
        description: "Bounded journal of plugin events",
        hooks: [HOOK_EVENT],
        permissions: [plughost_plugin::sandbox::PERMISSION_TRIGGER_HOOKS],
        interfaces: [INTERFACE],
    )
}

/// Registers the plugin factory with `loader`.
pub fn register(loader: &mut FactoryLoader) {
    loader.register(MAIN, |_| Ok(Arc::new(EventLogPlugin::new()) as Arc<dyn Plugin>));
}
