//! Event log plugin implementation.

use std::sync::{Arc, OnceLock};

use serde_json::{Value, json};
use tracing::info;

use plughost_plugin::prelude::*;

use crate::hooks::RecordEventHook;
use crate::journal::EventJournal;
use crate::HOOK_EVENT;

/// Plugin keeping a journal of `plugin.event` hooks.
#[derive(Debug)]
pub struct EventLogPlugin {
    /// Recorded events.
    journal: Arc<EventJournal>,
    /// Host context captured at `init`.
    context: Arc<OnceLock<PluginContext>>,
}

impl EventLogPlugin {
    /// Create a new event log plugin
    pub fn new() -> Self {
        Self::with_journal(Arc::new(EventJournal::default()))
    }

    /// Create a plugin writing into an existing journal
    pub fn with_journal(journal: Arc<EventJournal>) -> Self {
        Self {
            journal,
            context: Arc::new(OnceLock::new()),
        }
    }

    /// Get the journal
    pub fn journal(&self) -> &Arc<EventJournal> {
        &self.journal
    }
}

impl Default for EventLogPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for EventLogPlugin {
    async fn init(&self, ctx: &PluginContext) -> AppResult<()> {
        if self.context.set(ctx.clone()).is_err() {
            return Err(AppError::conflict(format!(
                "Event log plugin '{}' was initialised twice",
                ctx.plugin_id()
            )));
        }
        info!(plugin_id = %ctx.plugin_id(), "Event log plugin initialised");
        Ok(())
    }

    async fn cleanup(&self) -> AppResult<()> {
        let dropped = self.journal.clear().await;
        info!(dropped, "Event log plugin cleaned up");
        Ok(())
    }

    async fn handle_action(&self, action: &str, payload: Value) -> AppResult<Value> {
        match action {
            "count" => Ok(json!(self.journal.len().await)),
            "entries" => Ok(serde_json::to_value(self.journal.entries().await)?),
            "clear" => Ok(json!(self.journal.clear().await)),
            "record" => {
                let hook = payload
                    .get("hook")
                    .and_then(Value::as_str)
                    .unwrap_or(HOOK_EVENT)
                    .to_string();
                let data = payload.get("data").cloned().unwrap_or(Value::Null);
                let entry = self.journal.record(&hook, data).await;
                Ok(serde_json::to_value(entry)?)
            }
            other => Err(AppError::not_found(format!(
                "Unsupported event log action '{other}'"
            ))),
        }
    }

    fn hook_bindings(&self) -> Vec<HookBinding> {
        vec![HookBinding::new(
            HOOK_EVENT,
            DEFAULT_PRIORITY,
            Arc::new(RecordEventHook::new(
                self.journal.clone(),
                self.context.clone(),
            )),
        )]
    }
}
