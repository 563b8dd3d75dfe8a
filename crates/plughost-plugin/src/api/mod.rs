//! Plugin API — what plugin code can reach from inside the host.

pub mod context;

pub use context::PluginContext;
