//! Per-request registry of lazily loaded subtrees.
//!
//! Every lazy reference is keyed by its logical id and moves through
//! `Idle → Loading → Resolved | Rejected`. In server mode a reference whose
//! loader is synchronous is already part of the server bundle, so it goes
//! straight from absent to `Resolved` without an observable `Loading` state.
//! Server mode also records each chunk resolved during the request so the
//! renderer can tell the client which chunks to preload.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture, FutureExt};
use tokio::sync::mpsc;

use crate::context::RenderMode;
use crate::error::ViewError;
use crate::operation::PendingOperation;
use crate::view::{Component, Element, RenderScope};

/// Load state of one lazy reference.
#[derive(Clone)]
pub enum LoadState {
    /// Loader known but not yet invoked.
    Idle,
    /// Loader invoked, result not yet available.
    Loading,
    Resolved(Element),
    /// Load failed. Never retried automatically.
    Rejected(String),
}

impl LoadState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl std::fmt::Debug for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Loading => write!(f, "Loading"),
            Self::Resolved(_) => write!(f, "Resolved"),
            Self::Rejected(reason) => f.debug_tuple("Rejected").field(reason).finish(),
        }
    }
}

/// A chunk resolved while rendering on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchedChunk {
    /// Manifest logical path of the chunk.
    pub chunk_id: String,
    /// Logical id of the lazy reference that resolved it.
    pub logical_id: String,
}

struct LazyEntry {
    chunk_id: String,
    state: LoadState,
}

type Settlement = (String, Result<Element, String>);

/// Lazy reference registry for one render request.
pub struct ChunkManager {
    mode: RenderMode,
    entries: HashMap<String, LazyEntry>,
    touched: Vec<TouchedChunk>,
    loads: Vec<(String, PendingOperation)>,
    settled_tx: mpsc::UnboundedSender<Settlement>,
    settled_rx: mpsc::UnboundedReceiver<Settlement>,
}

impl ChunkManager {
    pub fn new(mode: RenderMode) -> Self {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        Self {
            mode,
            entries: HashMap::new(),
            touched: Vec::new(),
            loads: Vec::new(),
            settled_tx,
            settled_rx,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Current state of `logical_id`, `None` if it was never seen.
    pub fn state(&self, logical_id: &str) -> Option<&LoadState> {
        self.entries.get(logical_id).map(|entry| &entry.state)
    }

    /// Make a reference known without invoking its loader.
    pub fn declare(&mut self, chunk_id: &str, logical_id: &str) {
        self.entries
            .entry(logical_id.to_string())
            .or_insert_with(|| LazyEntry {
                chunk_id: chunk_id.to_string(),
                state: LoadState::Idle,
            });
    }

    /// Record a resolved value for `logical_id`.
    ///
    /// In server mode the chunk is appended to the touched list.
    pub fn register(&mut self, chunk_id: &str, logical_id: &str, value: Element) {
        self.entries.insert(
            logical_id.to_string(),
            LazyEntry {
                chunk_id: chunk_id.to_string(),
                state: LoadState::Resolved(value),
            },
        );

        if self.mode == RenderMode::Server {
            self.touched.push(TouchedChunk {
                chunk_id: chunk_id.to_string(),
                logical_id: logical_id.to_string(),
            });
        }
    }

    /// Start an asynchronous load for an absent or `Idle` reference.
    ///
    /// Returns false if the reference is already loading or settled. The
    /// result is applied on the next [`settle`](Self::settle).
    pub fn begin_load<F>(&mut self, chunk_id: &str, logical_id: &str, load: F) -> bool
    where
        F: Future<Output = Result<Element, String>> + Send + 'static,
    {
        if matches!(
            self.state(logical_id),
            Some(LoadState::Loading | LoadState::Resolved(_) | LoadState::Rejected(_))
        ) {
            return false;
        }

        self.entries.insert(
            logical_id.to_string(),
            LazyEntry {
                chunk_id: chunk_id.to_string(),
                state: LoadState::Loading,
            },
        );

        let tx = self.settled_tx.clone();
        let id = logical_id.to_string();
        let operation = PendingOperation::spawn(format!("lazy:{logical_id}"), async move {
            let result = load.await;
            let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
            let _ = tx.send((id, result));
            outcome
        });
        self.loads.push((logical_id.to_string(), operation));

        tracing::debug!(chunk_id, logical_id, "lazy load started");
        true
    }

    /// Apply finished loads. Returns how many references changed state.
    pub fn settle(&mut self) -> usize {
        let mut changed = 0;
        while let Ok((logical_id, result)) = self.settled_rx.try_recv() {
            let Some(entry) = self.entries.get(&logical_id) else {
                continue;
            };
            if !matches!(entry.state, LoadState::Loading) {
                continue;
            }

            match result {
                Ok(value) => {
                    let chunk_id = entry.chunk_id.clone();
                    self.register(&chunk_id, &logical_id, value);
                }
                Err(reason) => {
                    tracing::warn!(logical_id = %logical_id, reason = %reason, "lazy load rejected");
                    if let Some(entry) = self.entries.get_mut(&logical_id) {
                        entry.state = LoadState::Rejected(reason);
                    }
                }
            }
            changed += 1;
        }
        changed
    }

    /// Handles for loads that are still in flight.
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.loads
            .iter()
            .filter(|(id, op)| {
                !op.is_settled() && matches!(self.state(id), Some(LoadState::Loading))
            })
            .map(|(_, op)| op.clone())
            .collect()
    }

    /// Abort every load that has not finished. The returned future resolves
    /// once each aborted task has actually stopped.
    pub fn cancel_pending(&self) -> impl Future<Output = ()> + Send + 'static {
        let aborted: Vec<_> = self
            .loads
            .iter()
            .filter(|(_, op)| !op.is_settled())
            .map(|(_, op)| {
                op.cancel();
                op.wait()
            })
            .collect();
        join_all(aborted).map(|_| ())
    }

    /// Chunks resolved during this request, in resolution order.
    pub fn touched_chunks(&self) -> &[TouchedChunk] {
        &self.touched
    }
}

type SyncLoader = Arc<dyn Fn() -> Element + Send + Sync>;
type AsyncLoader = Arc<dyn Fn() -> BoxFuture<'static, Result<Element, String>> + Send + Sync>;

/// How a lazy reference obtains its subtree.
#[derive(Clone)]
pub enum LazyLoader {
    /// Module is bundled with the server; resolvable without awaiting.
    Sync(SyncLoader),
    /// Module has to be fetched.
    Async(AsyncLoader),
}

/// Component that renders a lazily loaded subtree.
///
/// Renders `fallback` (or nothing) until the reference resolves, then the
/// loaded subtree. A rejected load fails the render pass.
#[derive(Clone)]
pub struct Lazy {
    chunk_id: String,
    logical_id: String,
    loader: LazyLoader,
    fallback: Option<Element>,
}

impl Lazy {
    /// A reference build instrumentation marked as synchronously resolvable.
    pub fn sync<F>(chunk_id: impl Into<String>, logical_id: impl Into<String>, load: F) -> Self
    where
        F: Fn() -> Element + Send + Sync + 'static,
    {
        Self {
            chunk_id: chunk_id.into(),
            logical_id: logical_id.into(),
            loader: LazyLoader::Sync(Arc::new(load)),
            fallback: None,
        }
    }

    /// A reference whose module is loaded asynchronously.
    pub fn deferred<F, Fut>(
        chunk_id: impl Into<String>,
        logical_id: impl Into<String>,
        load: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Element, String>> + Send + 'static,
    {
        let loader: AsyncLoader = Arc::new(move || load().boxed());
        Self {
            chunk_id: chunk_id.into(),
            logical_id: logical_id.into(),
            loader: LazyLoader::Async(loader),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Element) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn into_element(self) -> Element {
        Arc::new(self)
    }

    fn start(&self, chunks: &mut ChunkManager) -> LoadState {
        match (&self.loader, chunks.mode()) {
            (LazyLoader::Sync(load), RenderMode::Server) => {
                let value = load();
                chunks.register(&self.chunk_id, &self.logical_id, value.clone());
                LoadState::Resolved(value)
            }
            (LazyLoader::Sync(load), RenderMode::Client) => {
                let value = load();
                chunks.declare(&self.chunk_id, &self.logical_id);
                chunks.begin_load(&self.chunk_id, &self.logical_id, async move { Ok(value) });
                LoadState::Loading
            }
            (LazyLoader::Async(load), _) => {
                chunks.declare(&self.chunk_id, &self.logical_id);
                chunks.begin_load(&self.chunk_id, &self.logical_id, load());
                LoadState::Loading
            }
        }
    }
}

impl Component for Lazy {
    fn render(&self, scope: &mut RenderScope<'_>) -> Result<String, ViewError> {
        let current = scope.chunks().state(&self.logical_id).cloned();
        let state = match current {
            Some(LoadState::Idle) | None => self.start(scope.chunks()),
            Some(state) => state,
        };

        match state {
            LoadState::Resolved(element) => scope.render(&element),
            LoadState::Idle | LoadState::Loading => match &self.fallback {
                Some(fallback) => scope.render(fallback),
                None => Ok(String::new()),
            },
            LoadState::Rejected(reason) => Err(ViewError::new(format!(
                "lazy module '{}' failed to load: {reason}",
                self.logical_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use prerender_core::RenderRequest;

    use super::*;
    use crate::context::RenderContext;
    use crate::view::Markup;

    fn context(mode: RenderMode) -> RenderContext {
        RenderContext::new(RenderRequest::get("/"), Duration::from_millis(500), mode)
    }

    fn render(element: &Element, cx: &RenderContext, chunks: &mut ChunkManager) -> String {
        RenderScope::new(cx, chunks).render(element).unwrap()
    }

    #[tokio::test]
    async fn test_register_records_touched_chunk_on_server() {
        let mut chunks = ChunkManager::new(RenderMode::Server);
        chunks.register("pages/home.js", "./pages/home", Markup::element("home"));

        assert!(chunks.state("./pages/home").unwrap().is_resolved());
        assert_eq!(
            chunks.touched_chunks(),
            &[TouchedChunk {
                chunk_id: "pages/home.js".to_string(),
                logical_id: "./pages/home".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_register_does_not_touch_on_client() {
        let mut chunks = ChunkManager::new(RenderMode::Client);
        chunks.register("pages/home.js", "./pages/home", Markup::element("home"));
        assert!(chunks.state("./pages/home").unwrap().is_resolved());
        assert!(chunks.touched_chunks().is_empty());
    }

    #[tokio::test]
    async fn test_declare_is_idle() {
        let mut chunks = ChunkManager::new(RenderMode::Server);
        chunks.declare("a.js", "./a");
        assert!(matches!(chunks.state("./a"), Some(LoadState::Idle)));
        assert!(chunks.state("./b").is_none());
    }

    #[tokio::test]
    async fn test_sync_lazy_resolves_during_first_pass() {
        let cx = context(RenderMode::Server);
        let mut chunks = ChunkManager::new(RenderMode::Server);
        let lazy = Lazy::sync("widgets/chart.js", "./widgets/chart", || {
            Markup::element("<canvas></canvas>")
        })
        .with_fallback(Markup::element("loading"))
        .into_element();

        assert_eq!(render(&lazy, &cx, &mut chunks), "<canvas></canvas>");
        assert!(chunks.state("./widgets/chart").unwrap().is_resolved());
        assert!(chunks.pending_operations().is_empty());
        assert_eq!(chunks.touched_chunks().len(), 1);

        // Later passes reuse the resolved value without touching again.
        assert_eq!(render(&lazy, &cx, &mut chunks), "<canvas></canvas>");
        assert_eq!(chunks.touched_chunks().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_lazy_goes_through_loading_on_client() {
        let cx = context(RenderMode::Client);
        let mut chunks = ChunkManager::new(RenderMode::Client);
        let lazy = Lazy::sync("chart.js", "./chart", || Markup::element("chart"))
            .with_fallback(Markup::element("..."))
            .into_element();

        assert_eq!(render(&lazy, &cx, &mut chunks), "...");
        assert!(matches!(chunks.state("./chart"), Some(LoadState::Loading)));

        for op in chunks.pending_operations() {
            op.wait().await;
        }
        assert_eq!(chunks.settle(), 1);
        assert_eq!(render(&lazy, &cx, &mut chunks), "chart");
        assert!(chunks.touched_chunks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_lazy_resolves_after_settle() {
        let cx = context(RenderMode::Server);
        let mut chunks = ChunkManager::new(RenderMode::Server);
        let lazy = Lazy::deferred("reviews.js", "./reviews", || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Markup::element("<ul>reviews</ul>"))
        })
        .into_element();

        assert_eq!(render(&lazy, &cx, &mut chunks), "");
        let pending = chunks.pending_operations();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].label(), "lazy:./reviews");

        // A second pass while loading must not start another load.
        assert_eq!(render(&lazy, &cx, &mut chunks), "");
        assert_eq!(chunks.pending_operations().len(), 1);

        pending[0].wait().await;
        chunks.settle();
        assert_eq!(render(&lazy, &cx, &mut chunks), "<ul>reviews</ul>");
        assert!(chunks.pending_operations().is_empty());
        assert_eq!(chunks.touched_chunks()[0].chunk_id, "reviews.js");
    }

    #[tokio::test]
    async fn test_rejected_lazy_fails_render_and_is_not_retried() {
        let cx = context(RenderMode::Server);
        let mut chunks = ChunkManager::new(RenderMode::Server);
        let lazy = Lazy::deferred("gone.js", "./gone", || async {
            Err::<Element, _>("404".to_string())
        })
        .into_element();

        assert_eq!(render(&lazy, &cx, &mut chunks), "");
        for op in chunks.pending_operations() {
            op.wait().await;
        }
        chunks.settle();

        assert!(matches!(chunks.state("./gone"), Some(LoadState::Rejected(r)) if r == "404"));
        let error = RenderScope::new(&cx, &mut chunks).render(&lazy).unwrap_err();
        assert!(error.to_string().contains("404"));
        assert!(chunks.pending_operations().is_empty());
        assert!(!chunks.begin_load("gone.js", "./gone", async { Ok(Markup::element("x")) }));
    }

    #[tokio::test]
    async fn test_cancel_pending_aborts_loads() {
        let mut chunks = ChunkManager::new(RenderMode::Server);
        chunks.begin_load("slow.js", "./slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Markup::element("slow"))
        });
        let pending = chunks.pending_operations();
        chunks.cancel_pending().await;

        assert_eq!(
            pending[0].outcome(),
            Some(crate::operation::OperationOutcome::Cancelled)
        );
        assert_eq!(chunks.settle(), 0);
        assert!(matches!(chunks.state("./slow"), Some(LoadState::Loading)));
    }
}
