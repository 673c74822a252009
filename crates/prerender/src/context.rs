//! Per-request render context.

use std::time::Duration;

use chrono::{DateTime, Utc};
use prerender_core::RenderRequest;
use serde::Serialize;
use tokio::time::Instant;

// Roughly thirty years; caps budgets that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Environment a tree is being rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Server,
    Client,
}

/// Immutable bundle describing one render call.
///
/// Created at the start of a render and dropped when it returns; never
/// shared between requests.
#[derive(Debug, Clone)]
pub struct RenderContext {
    request: RenderRequest,
    mode: RenderMode,
    received_at: DateTime<Utc>,
    started_at: Instant,
    deadline: Instant,
}

impl RenderContext {
    /// Create a context whose deadline is `budget` from now.
    pub fn new(request: RenderRequest, budget: Duration, mode: RenderMode) -> Self {
        let started_at = Instant::now();
        Self {
            request,
            mode,
            received_at: Utc::now(),
            started_at,
            deadline: started_at
                .checked_add(budget)
                .unwrap_or_else(|| started_at + FAR_FUTURE),
        }
    }

    pub fn request(&self) -> &RenderRequest {
        &self.request
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Wall-clock time the render started.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Wall-clock time the render loop stops starting new passes.
    pub fn deadline_at(&self) -> DateTime<Utc> {
        let budget = self.deadline.duration_since(self.started_at);
        chrono::Duration::from_std(budget)
            .ok()
            .and_then(|budget| self.received_at.checked_add_signed(budget))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Monotonic start of the render.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Monotonic deadline.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// True once the deadline has been reached.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
