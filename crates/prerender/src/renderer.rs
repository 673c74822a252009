//! Deadline-bounded iterative server renderer.
//!
//! A render runs the composed tree once, then keeps re-rendering while
//! plugins or lazy loads report pending work, the deadline has not passed,
//! no plugin asked to abort and the pass budget is not spent. Between passes
//! it waits for whichever comes first: the deadline or all pending work
//! settling. Missing the deadline is not an error; the response simply
//! carries the most complete markup produced so far.

use std::any::Any;
use std::collections::HashSet;
use std::iter;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use prerender_core::markup::{hydration_script, preload_link};
use prerender_core::{AssetManifest, DocumentTemplate, Headers, RenderRequest, RendererConfig};
use serde::Serialize;
use tracing::Instrument;

use crate::chunks::ChunkManager;
use crate::context::{RenderContext, RenderMode};
use crate::error::{RenderError, RenderIssue, Result};
use crate::host::PluginHost;
use crate::operation::{OperationOutcome, PendingOperation};
use crate::plugin::PluginList;
use crate::view::{Element, RenderScope};

/// Per-call overrides of the renderer config.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub deadline: Option<Duration>,
    /// Clamped to at least one pass.
    pub max_iterations: Option<usize>,
}

impl RenderOptions {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

/// Why the render loop stopped starting new passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No work left pending.
    Settled,
    Deadline,
    /// A plugin asked to stop.
    Aborted,
    IterationBudget,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::Settled => "settled",
            Self::Deadline => "deadline",
            Self::Aborted => "aborted",
            Self::IterationBudget => "iteration_budget",
        };
        f.write_str(reason)
    }
}

/// Diagnostics for one render call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    /// Passes executed, failed ones included.
    pub render_count: usize,
    pub latency: Duration,
    pub stop_reason: StopReason,
    /// Physical paths emitted as module preloads, in emission order.
    pub preloaded_chunks: Vec<String>,
}

/// HTTP-shaped render output.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
    pub stats: RenderStats,
    /// Non-fatal problems. Informational only; never changes `status`.
    pub errors: Vec<RenderIssue>,
}

/// Renders one application for many requests.
///
/// Holds only immutable, shareable data; every call builds its own context,
/// plugin host and chunk registry.
pub struct ServerRenderer {
    root: Element,
    template: DocumentTemplate,
    manifest: Arc<AssetManifest>,
    plugins: PluginList,
    config: RendererConfig,
}

impl ServerRenderer {
    /// Create a renderer.
    ///
    /// Parses the template once and checks that plugin names are unique and
    /// that the entrypoint and its imports are part of the manifest.
    pub fn new(
        root: Element,
        template_html: &str,
        manifest: Arc<AssetManifest>,
        plugins: PluginList,
        config: RendererConfig,
    ) -> Result<Self> {
        let template = DocumentTemplate::parse(template_html, &config.mount_id)?;

        let mut names = HashSet::new();
        for name in plugins.names() {
            if !names.insert(name) {
                return Err(RenderError::DuplicatePlugin(name.to_string()));
            }
        }

        manifest.list_dependencies(&config.entrypoint)?;

        tracing::info!(
            entrypoint = %config.entrypoint,
            plugins = plugins.len(),
            manifest_entries = manifest.len(),
            "Server renderer initialized"
        );

        Ok(Self {
            root,
            template,
            manifest,
            plugins,
            config,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.names()
    }

    /// Render with the configured deadline and pass budget.
    pub async fn render(&self, request: RenderRequest) -> Result<RenderResult> {
        self.render_with(request, RenderOptions::default()).await
    }

    /// Render with per-call overrides.
    ///
    /// Fails only for plugin lifecycle errors or manifest defects; errors
    /// raised while rendering the tree are reported in
    /// [`RenderResult::errors`].
    pub async fn render_with(
        &self,
        request: RenderRequest,
        options: RenderOptions,
    ) -> Result<RenderResult> {
        let span = tracing::info_span!(
            "render",
            path = %request.route(),
            method = %request.method
        );
        self.render_inner(request, options).instrument(span).await
    }

    async fn render_inner(
        &self,
        request: RenderRequest,
        options: RenderOptions,
    ) -> Result<RenderResult> {
        let budget = options.deadline.unwrap_or_else(|| self.config.deadline());
        let max_iterations = options
            .max_iterations
            .unwrap_or(self.config.max_iterations)
            .max(1);

        let context = RenderContext::new(request, budget, RenderMode::Server);
        let mut host = PluginHost::new(&self.plugins, &context)?;
        let app = host.decorate_app(Arc::clone(&self.root))?;
        let mut chunks = ChunkManager::new(RenderMode::Server);

        let mut markup = String::new();
        let mut errors = Vec::new();
        let mut render_count = 1;
        run_pass(&app, &context, &mut chunks, render_count, &mut markup, &mut errors);

        let stop_reason = loop {
            if host.should_abort_rendering()? {
                break StopReason::Aborted;
            }

            let mut pending = host.pending_operations()?;
            pending.extend(chunks.pending_operations());
            if pending.is_empty() {
                break StopReason::Settled;
            }
            if context.is_expired() {
                break StopReason::Deadline;
            }
            if render_count >= max_iterations {
                break StopReason::IterationBudget;
            }

            tracing::debug!(pending = pending.len(), "waiting for pending operations");
            wait_for_progress(&context, &pending).await;
            record_failures(&pending, &mut errors);

            chunks.settle();
            render_count += 1;
            run_pass(&app, &context, &mut chunks, render_count, &mut markup, &mut errors);
        };

        let chunk_loads_stopped = chunks.cancel_pending();
        host.cancel_pending_operations().await?;
        chunk_loads_stopped.await;

        let mut document = self.template.instantiate();
        document.set_mount_html(markup);
        host.render_html(&mut document)?;

        let bootstrap = host.client_bootstrap_data()?;
        let entry = self.manifest.translate_path(&self.config.entrypoint)?;
        document.push_body_end(hydration_script(&self.config.asset_url(entry), &bootstrap)?);

        let roots: Vec<&str> = iter::once(self.config.entrypoint.as_str())
            .chain(
                chunks
                    .touched_chunks()
                    .iter()
                    .map(|chunk| chunk.chunk_id.as_str()),
            )
            .collect();
        for stylesheet in self.manifest.list_stylesheets(roots.iter().copied())? {
            document.add_stylesheet(&self.config.asset_url(&stylesheet));
        }
        let preloaded_chunks = self.manifest.resolve_preloads(roots.iter().copied())?;
        for chunk in &preloaded_chunks {
            document.push_head(preload_link(&self.config.asset_url(chunk)));
        }

        let body = document.to_html();
        let latency = context.elapsed();

        for issue in &errors {
            tracing::warn!(issue = %issue, "render issue");
        }
        tracing::info!(
            render_count,
            latency_ms = latency.as_millis() as u64,
            stop_reason = %stop_reason,
            issues = errors.len(),
            "render complete"
        );

        Ok(RenderResult {
            status: 200,
            headers: Headers::new().with("content-type", "text/html; charset=utf-8"),
            body,
            stats: RenderStats {
                render_count,
                latency,
                stop_reason,
                preloaded_chunks,
            },
            errors,
        })
    }
}

/// Wait until the deadline passes or every pending operation settles.
async fn wait_for_progress(context: &RenderContext, pending: &[PendingOperation]) {
    let settled = join_all(pending.iter().map(PendingOperation::wait));
    tokio::select! {
        _ = tokio::time::sleep_until(context.deadline()) => {
            tracing::debug!("deadline reached with work pending");
        }
        _ = settled => {}
    }
}

fn record_failures(pending: &[PendingOperation], errors: &mut Vec<RenderIssue>) {
    for op in pending {
        if let Some(OperationOutcome::Failed(message)) = op.outcome() {
            errors.push(RenderIssue::Operation {
                operation: op.label().to_string(),
                message,
            });
        }
    }
}

/// Run one pass, keeping the previous markup if it fails.
fn run_pass(
    app: &Element,
    context: &RenderContext,
    chunks: &mut ChunkManager,
    pass: usize,
    markup: &mut String,
    errors: &mut Vec<RenderIssue>,
) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        RenderScope::new(context, chunks).render(app)
    }));

    let message = match result {
        Ok(Ok(html)) => {
            *markup = html;
            tracing::debug!(
                pass,
                elapsed_ms = context.elapsed().as_millis() as u64,
                "render pass complete"
            );
            return;
        }
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    tracing::debug!(pass, error = %message, "render pass failed");
    errors.push(RenderIssue::Pass { pass, message });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("render pass panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("render pass panicked: {message}")
    } else {
        "render pass panicked".to_string()
    }
}
