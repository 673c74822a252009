use std::env;

use prerender_core::{CoreError, RendererConfig, DEFAULT_DEADLINE_MS, DEFAULT_MAX_ITERATIONS};

/// Renderer settings loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Render deadline in milliseconds (default: 500)
    pub deadline_ms: u64,
    /// Maximum render passes per request (default: 4)
    pub max_iterations: usize,
    /// Public URL prefix for built assets (default: "/")
    pub asset_base: String,
    /// Id of the template element the app mounts into (default: "root")
    pub mount_id: String,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PRERENDER_DEADLINE_MS` - Render deadline in milliseconds (default: 500)
    /// - `PRERENDER_MAX_ITERATIONS` - Maximum render passes (default: 4)
    /// - `PRERENDER_ASSET_BASE` - Public asset URL prefix (default: "/")
    /// - `PRERENDER_MOUNT_ID` - Mount element id (default: "root")
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            deadline_ms: lookup("PRERENDER_DEADLINE_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DEADLINE_MS),
            max_iterations: lookup("PRERENDER_MAX_ITERATIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_ITERATIONS),
            asset_base: lookup("PRERENDER_ASSET_BASE").unwrap_or_else(|| "/".to_string()),
            mount_id: lookup("PRERENDER_MOUNT_ID").unwrap_or_else(|| "root".to_string()),
        }
    }

    /// Validated renderer config for `entrypoint`.
    pub fn renderer_config(&self, entrypoint: &str) -> Result<RendererConfig, CoreError> {
        RendererConfig::new(
            entrypoint,
            self.deadline_ms,
            self.max_iterations,
            self.asset_base.as_str(),
            self.mount_id.as_str(),
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
