//! Hook handlers for the event log plugin.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use plughost_plugin::prelude::*;
use plughost_plugin::sandbox::PERMISSION_TRIGGER_HOOKS;

use crate::journal::EventJournal;
use crate::{HOOK_EVENT, HOOK_RECORDED};

/// Context key the handler stamps with the recorded entry id.
pub const ENTRY_ID_KEY: &str = "event_log.entry_id";

/// Records every `plugin.event` into the journal.
#[derive(Debug)]
pub struct RecordEventHook {
    /// Journal shared with the plugin.
    journal: Arc<EventJournal>,
    /// Host context, set once the plugin has initialised.
    context: Arc<OnceLock<PluginContext>>,
}

impl RecordEventHook {
    /// Create a new record hook handler
    pub fn new(journal: Arc<EventJournal>, context: Arc<OnceLock<PluginContext>>) -> Self {
        Self { journal, context }
    }

    async fn announce(&self, entry_id: &str) {
        let Some(ctx) = self.context.get() else {
            return;
        };
        if !ctx.sandbox().check_permission(PERMISSION_TRIGGER_HOOKS) {
            return;
        }

        let announcement = HookContext::new()
            .with_string("entry_id", entry_id)
            .with_string("hook", HOOK_EVENT);
        if let Err(e) = ctx.trigger(HOOK_RECORDED, announcement).await {
            warn!(plugin_id = %ctx.plugin_id(), error = %e, "Failed to announce journal entry");
        }
    }
}

#[async_trait]
impl HookHandler for RecordEventHook {
    async fn handle(&self, context: &HookContext) -> HookResult {
        let entry = self
            .journal
            .record(HOOK_EVENT, Value::Object(context.data.clone()))
            .await;
        let entry_id = entry.id.to_string();

        debug!(entry_id = %entry_id, keys = context.len(), "Recorded plugin event");
        self.announce(&entry_id).await;

        Ok(HookAction::Replace(
            context.clone().with_string(ENTRY_ID_KEY, &entry_id),
        ))
    }
}
