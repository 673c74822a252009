//! Renderer configuration with validation.

use std::time::Duration;

use crate::error::{CoreError, Result};

/// Default render deadline in milliseconds.
pub const DEFAULT_DEADLINE_MS: u64 = 500;

/// Default maximum number of render passes per request.
pub const DEFAULT_MAX_ITERATIONS: usize = 4;

/// Configuration for a `ServerRenderer` (validated).
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Logical path of the client entrypoint in the asset manifest.
    pub entrypoint: String,
    /// Time budget for the iterative render loop, in milliseconds.
    pub deadline_ms: u64,
    /// Upper bound on render passes, including the initial one.
    pub max_iterations: usize,
    /// Public URL prefix prepended to physical asset paths.
    pub asset_base: String,
    /// `id` attribute of the element the markup is mounted into.
    pub mount_id: String,
}

impl RendererConfig {
    /// Create and validate renderer config.
    pub fn new(
        entrypoint: impl Into<String>,
        deadline_ms: u64,
        max_iterations: usize,
        asset_base: impl Into<String>,
        mount_id: impl Into<String>,
    ) -> Result<Self> {
        let entrypoint = entrypoint.into();
        let mount_id = mount_id.into();

        if entrypoint.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "entrypoint must not be empty".to_string(),
            ));
        }
        if max_iterations == 0 {
            return Err(CoreError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if mount_id.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "mount_id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            entrypoint,
            deadline_ms,
            max_iterations,
            asset_base: normalize_base(asset_base.into()),
            mount_id,
        })
    }

    /// Create with defaults (500ms deadline, 4 passes, `/` base, `root` mount).
    pub fn with_defaults(entrypoint: impl Into<String>) -> Result<Self> {
        Self::new(
            entrypoint,
            DEFAULT_DEADLINE_MS,
            DEFAULT_MAX_ITERATIONS,
            "/",
            "root",
        )
    }

    /// Get the deadline as a Duration.
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Public URL for a physical asset path.
    pub fn asset_url(&self, physical: &str) -> String {
        format!("{}{}", self.asset_base, physical.trim_start_matches('/'))
    }
}

fn normalize_base(base: String) -> String {
    if base.is_empty() {
        "/".to_string()
    } else if base.ends_with('/') {
        base
    } else {
        format!("{base}/")
    }
}
