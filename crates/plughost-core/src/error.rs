//! Unified application error types for plughost.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. The first six kinds form the plugin
//! failure taxonomy reported on plugin records and in batch-load results.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Adding a dependency edge would close a cycle.
    CircularDependency,
    /// A declared dependency is absent or not in a usable state.
    MissingDependency,
    /// Plugin metadata is malformed or incomplete.
    ValidationFailure,
    /// A permission or API check failed.
    SandboxDenied,
    /// A plugin's own init/activate/deactivate/cleanup code failed or timed out.
    LifecycleHookFailure,
    /// An unload was attempted while dependents remain.
    UnloadBlocked,
    /// The requested plugin or resource was not found.
    NotFound,
    /// A conflict occurred (duplicate id, duplicate interface provider, etc.).
    Conflict,
    /// The requested state change is not an edge of the lifecycle state machine.
    InvalidTransition,
    /// A hook handler failed while `stop_on_error` was set.
    HookFailure,
    /// An operation outside any single plugin exceeded its deadline.
    Timeout,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A filesystem I/O error occurred.
    Io,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircularDependency => write!(f, "CIRCULAR_DEPENDENCY"),
            Self::MissingDependency => write!(f, "MISSING_DEPENDENCY"),
            Self::ValidationFailure => write!(f, "VALIDATION_FAILURE"),
            Self::SandboxDenied => write!(f, "SANDBOX_DENIED"),
            Self::LifecycleHookFailure => write!(f, "LIFECYCLE_HOOK_FAILURE"),
            Self::UnloadBlocked => write!(f, "UNLOAD_BLOCKED"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::InvalidTransition => write!(f, "INVALID_TRANSITION"),
            Self::HookFailure => write!(f, "HOOK_FAILURE"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Io => write!(f, "IO"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified application error used throughout plughost.
///
/// All crate-specific errors are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls. This provides a single error type for
/// the entire host boundary.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a circular-dependency error.
    pub fn circular_dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CircularDependency, message)
    }

    /// Create a missing-dependency error.
    pub fn missing_dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingDependency, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailure, message)
    }

    /// Create a sandbox-denied error.
    pub fn sandbox_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SandboxDenied, message)
    }

    /// Create a lifecycle-hook failure.
    pub fn lifecycle_hook(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LifecycleHookFailure, message)
    }

    /// Create an unload-blocked error.
    pub fn unload_blocked(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnloadBlocked, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create an invalid-transition error.
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTransition, message)
    }

    /// Create a hook-failure error.
    pub fn hook_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HookFailure, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Returns `true` if this error belongs to the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Io, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
