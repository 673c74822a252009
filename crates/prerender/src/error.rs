//! Render errors and non-fatal render issues.

use prerender_core::CoreError;
use serde::Serialize;
use thiserror::Error;

/// Fatal render errors.
///
/// Only configuration, manifest and plugin lifecycle failures end up here.
/// Failures inside a render pass are recorded as [`RenderIssue`]s instead.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Plugin '{plugin}' failed in {hook}: {reason}")]
    Plugin {
        plugin: String,
        hook: &'static str,
        reason: String,
    },

    #[error("Plugin '{0}' is registered more than once")]
    DuplicatePlugin(String),

    #[error("Plugin '{plugin}' state has an unexpected type")]
    StateMismatch { plugin: String },
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Sanitize error messages for client-facing responses.
///
/// Hides internal details while providing useful feedback.
pub fn sanitize_error(error: &RenderError) -> String {
    match error {
        RenderError::Core(CoreError::ManifestLookup { .. })
        | RenderError::Core(CoreError::ManifestParse(_)) => {
            "Internal configuration error".to_string()
        }
        RenderError::Core(_) => "Render failed".to_string(),
        RenderError::Plugin { .. }
        | RenderError::DuplicatePlugin(_)
        | RenderError::StateMismatch { .. } => "Render failed".to_string(),
    }
}

/// Error returned by a component while producing markup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ViewError(String);

impl ViewError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error returned by a plugin hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PluginError(String);

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A non-fatal problem encountered while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderIssue {
    /// A render pass returned an error or panicked.
    Pass { pass: usize, message: String },
    /// A pending operation settled with a failure.
    Operation { operation: String, message: String },
}

impl std::fmt::Display for RenderIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass { pass, message } => write!(f, "render pass {pass} failed: {message}"),
            Self::Operation { operation, message } => {
                write!(f, "operation '{operation}' failed: {message}")
            }
        }
    }
}
