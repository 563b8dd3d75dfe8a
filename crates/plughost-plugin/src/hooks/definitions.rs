//! Hook context, handler results, and trigger options.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use plughost_core::config::HookConfig;
use plughost_core::AppResult;

/// Open key-value record threaded through a hook's fan-out chain.
///
/// Each handler sees the record produced by the previous one. Handlers that
/// want to change it return [`HookAction::Replace`] with the new record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookContext {
    /// Arbitrary data keyed by string.
    pub data: Map<String, Value>,
}

impl HookContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value and returns the context.
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// Inserts a string value.
    pub fn with_string(self, key: &str, value: &str) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Inserts an integer value.
    pub fn with_int(self, key: &str, value: i64) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Inserts a boolean value.
    pub fn with_bool(self, key: &str, value: bool) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Inserts a value in place, returning the previous one.
    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        self.data.insert(key.to_string(), value)
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Gets a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a string value.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Gets an i64 value.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    /// Gets a bool value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the context holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Map<String, Value>> for HookContext {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

/// What a handler wants the dispatcher to do with the context.
#[derive(Debug, Clone, PartialEq)]
pub enum HookAction {
    /// Pass the current context on unchanged.
    Continue,
    /// Pass this record to the next handler instead.
    Replace(HookContext),
}

/// Result returned from a hook handler invocation.
///
/// An `Err` is a handler failure: logged and skipped, or propagated when the
/// trigger was issued with `stop_on_error`.
pub type HookResult = AppResult<HookAction>;

/// Per-call options for `trigger`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerOptions {
    /// Abort the chain and return the first handler error.
    pub stop_on_error: bool,
    /// Per-handler deadline. `None` uses the dispatcher default.
    pub timeout: Option<Duration>,
}

impl TriggerOptions {
    /// Options that abort on the first handler failure.
    pub fn stop_on_error() -> Self {
        Self {
            stop_on_error: true,
            timeout: None,
        }
    }

    /// Sets the per-handler deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<&HookConfig> for TriggerOptions {
    fn from(config: &HookConfig) -> Self {
        Self {
            stop_on_error: config.stop_on_error,
            timeout: Some(config.handler_timeout()),
        }
    }
}
