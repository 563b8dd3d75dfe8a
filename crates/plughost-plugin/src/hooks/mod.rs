//! Hook system — subscription registry, dispatcher, and context types.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::{HookAction, HookContext, HookResult, TriggerOptions};
pub use dispatcher::{HookDispatcher, OwnerActivity};
pub use registry::{HookHandler, HookRegistry, HookSubscription};
