//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use plughost_core::{AppError, AppResult, ErrorKind};

pub use crate::api::context::PluginContext;
pub use crate::hooks::definitions::{HookAction, HookContext, HookResult, TriggerOptions};
pub use crate::hooks::registry::HookHandler;
pub use crate::metadata::{PluginMetadata, PluginSource};
pub use crate::record::PluginState;
pub use crate::traits::{ClosureHandler, DEFAULT_PRIORITY, HookBinding, Plugin};

pub use crate::{hook_context, plugin_metadata};
