//! End-to-end tests of the render loop, plugin lifecycle and preloads.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use prerender::{
    component, sanitize_error, AssetManifest, CoreError, Document, Element, Lazy,
    ManifestEntry, Markup, PendingOperation, Plugin, PluginError, PluginList, Provider,
    RenderContext, RenderError, RenderIssue, RenderOptions, RenderRequest, RendererConfig,
    ServerRenderer, StopReason, ViewError,
};
use serde_json::Value;

const TEMPLATE: &str = concat!(
    "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">",
    "<title>Shop</title></head><body><div id=\"root\"></div></body></html>"
);

type Slot = Mutex<Option<String>>;

fn manifest() -> Arc<AssetManifest> {
    Arc::new(AssetManifest::from_entries([
        (
            "app.js",
            ManifestEntry::new("app.js-hash.js")
                .with_imports(&["layout.js"])
                .with_css(&["app.css"]),
        ),
        (
            "layout.js",
            ManifestEntry::new("layout.js-hash.js").with_imports(&["ui.js"]),
        ),
        ("ui.js", ManifestEntry::new("ui.js-hash.js")),
        (
            "widgets/chart.js",
            ManifestEntry::new("chart.js-hash.js")
                .with_imports(&["charts-lib.js", "ui.js"])
                .with_css(&["chart.css"]),
        ),
        ("charts-lib.js", ManifestEntry::new("charts-lib.js-hash.js")),
        ("pages/reviews.js", ManifestEntry::new("reviews.js-hash.js")),
    ]))
}

fn config() -> RendererConfig {
    RendererConfig::new("app.js", 500, 4, "/assets", "root").unwrap()
}

fn renderer(root: Element, plugins: PluginList) -> ServerRenderer {
    ServerRenderer::new(root, TEMPLATE, manifest(), plugins, config()).unwrap()
}

/// Reads the value provided by [`Fetch`].
fn data_view() -> Element {
    component(|scope| {
        let value = scope
            .use_context::<Slot>()
            .and_then(|slot| slot.lock().unwrap().clone());
        Ok(match value {
            Some(value) => format!("<p>{value}</p>"),
            None => "<p>loading</p>".to_string(),
        })
    })
}

/// Fetches one value after `delay` and provides it to the tree.
struct Fetch {
    delay: Duration,
    result: Result<&'static str, &'static str>,
    abort: bool,
    cancelled: Arc<AtomicBool>,
}

impl Fetch {
    fn after(delay: Duration) -> Self {
        Self {
            delay,
            result: Ok("ready"),
            abort: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct FetchState {
    operation: PendingOperation,
    data: Arc<Slot>,
}

impl Plugin for Fetch {
    type State = FetchState;

    fn name(&self) -> &str {
        "fetch"
    }

    fn create_state(&self, _context: &RenderContext) -> Result<FetchState, PluginError> {
        let data = Arc::new(Slot::new(None));
        let slot = Arc::clone(&data);
        let delay = self.delay;
        let result = self.result;
        let operation = PendingOperation::spawn("fetch", async move {
            tokio::time::sleep(delay).await;
            let value = result.map_err(str::to_string)?;
            *slot.lock().unwrap() = Some(value.to_string());
            Ok(())
        });
        Ok(FetchState { operation, data })
    }

    fn decorate_app(&self, state: &FetchState, app: Element) -> Result<Element, PluginError> {
        Ok(Provider::element(Arc::clone(&state.data), app))
    }

    fn should_abort_rendering(&self, _state: &FetchState) -> bool {
        self.abort
    }

    fn pending_operations(&self, state: &mut FetchState) -> Vec<PendingOperation> {
        vec![state.operation.clone()]
    }

    fn cancel_pending_operations(&self, state: &mut FetchState) -> BoxFuture<'static, ()> {
        state.operation.cancel();
        let wait = state.operation.wait();
        let cancelled = Arc::clone(&self.cancelled);
        Box::pin(async move {
            wait.await;
            cancelled.store(true, Ordering::SeqCst);
        })
    }

    fn client_bootstrap_data(&self, state: &FetchState) -> Option<Value> {
        state.data.lock().unwrap().clone().map(Value::String)
    }
}

/// Starts a new short operation every time it is asked.
struct Endless {
    started: Arc<AtomicUsize>,
}

impl Plugin for Endless {
    type State = ();

    fn name(&self) -> &str {
        "endless"
    }

    fn create_state(&self, _context: &RenderContext) -> Result<(), PluginError> {
        Ok(())
    }

    fn pending_operations(&self, _state: &mut ()) -> Vec<PendingOperation> {
        self.started.fetch_add(1, Ordering::SeqCst);
        vec![PendingOperation::spawn("tick", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        })]
    }
}

/// Wraps the tree in `<tag>` and tags the head.
struct Wrap(&'static str);

impl Plugin for Wrap {
    type State = ();

    fn name(&self) -> &str {
        self.0
    }

    fn create_state(&self, _context: &RenderContext) -> Result<(), PluginError> {
        Ok(())
    }

    fn decorate_app(&self, _state: &(), app: Element) -> Result<Element, PluginError> {
        let tag = self.0;
        Ok(component(move |scope| {
            Ok(format!("<{tag}>{}</{tag}>", scope.render(&app)?))
        }))
    }

    fn render_html(&self, _state: &mut (), document: &mut Document) -> Result<(), PluginError> {
        document.push_head(format!("<meta name=\"by\" content=\"{}\">", self.0));
        Ok(())
    }
}

/// Sets the title from the request path.
struct Title;

impl Plugin for Title {
    type State = String;

    fn name(&self) -> &str {
        "title"
    }

    fn create_state(&self, context: &RenderContext) -> Result<String, PluginError> {
        Ok(context.request().route().trim_start_matches('/').to_string())
    }

    fn render_html(&self, state: &mut String, document: &mut Document) -> Result<(), PluginError> {
        document.set_title(format!("Shop | {state}"));
        Ok(())
    }
}

struct Unconfigured;

impl Plugin for Unconfigured {
    type State = ();

    fn name(&self) -> &str {
        "unconfigured"
    }

    fn create_state(&self, _context: &RenderContext) -> Result<(), PluginError> {
        Err(PluginError::new("missing API key"))
    }
}

fn position(body: &str, needle: &str) -> usize {
    body.find(needle)
        .unwrap_or_else(|| panic!("{needle} not found in {body}"))
}

#[tokio::test(start_paused = true)]
async fn test_no_pending_work_renders_once() {
    let renderer = renderer(Markup::element("<h1>Home</h1>"), PluginList::new().with(Title));
    let result = renderer.render(RenderRequest::get("/home")).await.unwrap();

    assert_eq!(result.stats.render_count, 1);
    assert_eq!(result.stats.stop_reason, StopReason::Settled);
    assert_eq!(result.stats.latency, Duration::ZERO);
    assert!(result.body.contains("<div id=\"root\"><h1>Home</h1></div>"));
    assert!(result.body.contains("<title>Shop | home</title>"));
    assert!(!result.body.contains("<title>Shop</title>"));
}

#[tokio::test(start_paused = true)]
async fn test_zero_deadline_renders_once_with_pending_work() {
    let fetch = Fetch::after(Duration::from_millis(50));
    let cancelled = Arc::clone(&fetch.cancelled);
    let renderer = renderer(data_view(), PluginList::new().with(fetch));

    let options = RenderOptions::default().with_deadline(Duration::ZERO);
    let result = renderer
        .render_with(RenderRequest::get("/"), options)
        .await
        .unwrap();

    assert_eq!(result.stats.render_count, 1);
    assert_eq!(result.stats.stop_reason, StopReason::Deadline);
    assert!(result.body.contains("<p>loading</p>"));
    assert!(cancelled.load(Ordering::SeqCst));
    assert!(result.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_operation_settling_early_ends_loop_before_deadline() {
    let renderer = renderer(data_view(), PluginList::new().with(Fetch::after(Duration::from_millis(50))));
    let result = renderer.render(RenderRequest::get("/")).await.unwrap();

    assert_eq!(result.stats.render_count, 2);
    assert_eq!(result.stats.stop_reason, StopReason::Settled);
    assert!(result.stats.latency >= Duration::from_millis(50));
    assert!(result.stats.latency < Duration::from_millis(100));
    assert!(result.body.contains("<div id=\"root\"><p>ready</p></div>"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_operation_degrades_at_deadline() {
    let fetch = Fetch::after(Duration::from_secs(5));
    let cancelled = Arc::clone(&fetch.cancelled);
    let renderer = renderer(data_view(), PluginList::new().with(fetch));
    let result = renderer.render(RenderRequest::get("/")).await.unwrap();

    // One pass up front, one after the deadline fires.
    assert_eq!(result.stats.render_count, 2);
    assert_eq!(result.stats.stop_reason, StopReason::Deadline);
    assert!(result.stats.latency >= Duration::from_millis(500));
    assert!(result.stats.latency < Duration::from_secs(5));
    assert!(result.body.contains("<p>loading</p>"));
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_pass_budget_caps_render_count() {
    let started = Arc::new(AtomicUsize::new(0));
    let plugins = PluginList::new().with(Endless {
        started: Arc::clone(&started),
    });
    let renderer = renderer(Markup::element("x"), plugins);

    let result = renderer.render(RenderRequest::get("/")).await.unwrap();
    assert_eq!(result.stats.render_count, 4);
    assert_eq!(result.stats.stop_reason, StopReason::IterationBudget);

    let options = RenderOptions::default().with_max_iterations(0);
    let result = renderer
        .render_with(RenderRequest::get("/"), options)
        .await
        .unwrap();
    assert_eq!(result.stats.render_count, 1);
    assert_eq!(result.stats.stop_reason, StopReason::IterationBudget);
    assert!(started.load(Ordering::SeqCst) >= 5);
}

#[tokio::test(start_paused = true)]
async fn test_failed_pass_keeps_last_good_markup() {
    let root = component(|scope| {
        let ready = scope
            .use_context::<Slot>()
            .and_then(|slot| slot.lock().unwrap().clone());
        match ready {
            Some(_) => Err(ViewError::new("template bug")),
            None => Ok("<p>loading</p>".to_string()),
        }
    });
    let renderer = renderer(root, PluginList::new().with(Fetch::after(Duration::from_millis(10))));
    let result = renderer.render(RenderRequest::get("/")).await.unwrap();

    assert_eq!(result.status, 200);
    assert_eq!(result.stats.render_count, 2);
    assert_eq!(
        result.errors,
        vec![RenderIssue::Pass {
            pass: 2,
            message: "template bug".to_string(),
        }]
    );
    assert!(result.body.contains("<div id=\"root\"><p>loading</p></div>"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_operation_is_recorded_once() {
    let mut fetch = Fetch::after(Duration::from_millis(20));
    fetch.result = Err("upstream 503");
    let renderer = renderer(data_view(), PluginList::new().with(fetch));
    let result = renderer.render(RenderRequest::get("/")).await.unwrap();

    assert_eq!(result.stats.render_count, 2);
    assert_eq!(
        result.errors,
        vec![RenderIssue::Operation {
            operation: "fetch".to_string(),
            message: "upstream 503".to_string(),
        }]
    );
    assert!(result.body.contains("<p>loading</p>"));
}

#[tokio::test(start_paused = true)]
async fn test_abort_stops_loop_and_cancels_work() {
    let mut fetch = Fetch::after(Duration::from_millis(50));
    fetch.abort = true;
    let cancelled = Arc::clone(&fetch.cancelled);
    let renderer = renderer(data_view(), PluginList::new().with(fetch));
    let result = renderer.render(RenderRequest::get("/")).await.unwrap();

    assert_eq!(result.stats.render_count, 1);
    assert_eq!(result.stats.stop_reason, StopReason::Aborted);
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_create_state_failure_fails_the_request() {
    let renderer = renderer(
        Markup::element("x"),
        PluginList::new().with(Title).with(Unconfigured),
    );
    let error = renderer.render(RenderRequest::get("/")).await.unwrap_err();

    assert!(matches!(
        &error,
        RenderError::Plugin { plugin, hook: "create_state", reason }
            if plugin == "unconfigured" && reason == "missing API key"
    ));
    assert_eq!(sanitize_error(&error), "Render failed");
}

#[tokio::test]
async fn test_plugins_decorate_and_render_html_in_order() {
    let plugins = PluginList::new().with(Wrap("main")).with(Wrap("section"));
    let renderer = renderer(Markup::element("app"), plugins);
    let result = renderer.render(RenderRequest::get("/")).await.unwrap();

    assert!(result
        .body
        .contains("<div id=\"root\"><section><main>app</main></section></div>"));
    assert!(
        position(&result.body, "content=\"main\"") < position(&result.body, "content=\"section\"")
    );
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_data_reaches_hydration_script() {
    let plugins = PluginList::new()
        .with(Wrap("main"))
        .with(Fetch::after(Duration::from_millis(5)));
    let renderer = renderer(data_view(), plugins);
    let result = renderer.render(RenderRequest::get("/")).await.unwrap();

    assert!(result.body.contains(concat!(
        "<script type=\"module\">import hydrate from \"/assets/app.js-hash.js\";",
        "hydrate({\"fetch\":\"ready\"});</script></body>"
    )));
}

#[tokio::test]
async fn test_preloads_are_dependency_first_and_include_touched_chunks() {
    let chart = Lazy::sync("widgets/chart.js", "./widgets/chart", || {
        Markup::element("<canvas></canvas>")
    })
    .into_element();
    let root = component(move |scope| Ok(format!("<main>{}</main>", scope.render(&chart)?)));
    let result = renderer(root, PluginList::new())
        .render(RenderRequest::get("/"))
        .await
        .unwrap();

    assert_eq!(
        result.stats.preloaded_chunks,
        vec![
            "ui.js-hash.js",
            "layout.js-hash.js",
            "app.js-hash.js",
            "charts-lib.js-hash.js",
            "chart.js-hash.js",
        ]
    );

    let body = &result.body;
    assert_eq!(body.matches("rel=\"modulepreload\"").count(), 5);
    assert!(
        position(body, "href=\"/assets/ui.js-hash.js\"")
            < position(body, "href=\"/assets/layout.js-hash.js\"")
    );
    assert!(
        position(body, "href=\"/assets/charts-lib.js-hash.js\"")
            < position(body, "href=\"/assets/chart.js-hash.js\"")
    );
    assert!(
        position(body, "<link rel=\"stylesheet\" href=\"/assets/app.css\">")
            < position(body, "<link rel=\"stylesheet\" href=\"/assets/chart.css\">")
    );
    assert!(position(body, "chart.css") < position(body, "rel=\"modulepreload\""));
    assert!(body.contains("<main><canvas></canvas></main>"));
}

#[tokio::test]
async fn test_sync_lazy_is_resolved_within_first_pass() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let chart = Lazy::sync("widgets/chart.js", "./widgets/chart", || Markup::element("chart"))
        .with_fallback(Markup::element("spinner"))
        .into_element();
    let probe = {
        let observed = Arc::clone(&observed);
        component(move |scope| {
            let state = scope.chunks().state("./widgets/chart").cloned();
            observed.lock().unwrap().push(format!("{state:?}"));
            Ok(String::new())
        })
    };
    let root = component(move |scope| {
        let before = scope.render(&probe)?;
        let body = scope.render(&chart)?;
        let after = scope.render(&probe)?;
        Ok(format!("{before}{body}{after}"))
    });

    let result = renderer(root, PluginList::new())
        .render(RenderRequest::get("/"))
        .await
        .unwrap();

    assert_eq!(result.stats.render_count, 1);
    assert!(result.body.contains("<div id=\"root\">chart</div>"));
    assert_eq!(
        *observed.lock().unwrap(),
        vec!["None".to_string(), "Some(Resolved)".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_deferred_lazy_joins_the_deadline_race() {
    let reviews = Lazy::deferred("pages/reviews.js", "./pages/reviews", || async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(Markup::element("<ul>reviews</ul>"))
    })
    .with_fallback(Markup::element("<p>loading reviews</p>"))
    .into_element();

    let result = renderer(reviews, PluginList::new())
        .render(RenderRequest::get("/"))
        .await
        .unwrap();

    assert_eq!(result.stats.render_count, 2);
    assert_eq!(result.stats.stop_reason, StopReason::Settled);
    assert!(result.body.contains("<ul>reviews</ul>"));
    assert!(result
        .stats
        .preloaded_chunks
        .contains(&"reviews.js-hash.js".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_lazy_load_is_reported() {
    let broken = Lazy::deferred("pages/reviews.js", "./pages/reviews", || async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err::<Element, _>("chunk fetch failed".to_string())
    })
    .with_fallback(Markup::element("fallback"))
    .into_element();

    let result = renderer(broken, PluginList::new())
        .render(RenderRequest::get("/"))
        .await
        .unwrap();

    assert_eq!(result.stats.render_count, 2);
    assert_eq!(result.stats.stop_reason, StopReason::Settled);
    assert_eq!(
        result.errors,
        vec![
            RenderIssue::Operation {
                operation: "lazy:./pages/reviews".to_string(),
                message: "chunk fetch failed".to_string(),
            },
            RenderIssue::Pass {
                pass: 2,
                message: "lazy module './pages/reviews' failed to load: chunk fetch failed"
                    .to_string(),
            },
        ]
    );
    assert!(result.body.contains("<div id=\"root\">fallback</div>"));
    assert!(!result.body.contains("reviews.js-hash.js"));
}

#[tokio::test]
async fn test_unknown_touched_chunk_fails_fast() {
    let lazy = Lazy::sync("widgets/missing.js", "./widgets/missing", || Markup::element(""))
        .into_element();
    let error = renderer(lazy, PluginList::new())
        .render(RenderRequest::get("/"))
        .await
        .unwrap_err();

    assert!(matches!(
        &error,
        RenderError::Core(CoreError::ManifestLookup { path }) if path == "widgets/missing.js"
    ));
    assert_eq!(sanitize_error(&error), "Internal configuration error");
}

#[tokio::test(start_paused = true)]
async fn test_renders_are_deterministic_and_isolated() {
    let plugins = PluginList::new()
        .with(Title)
        .with(Fetch::after(Duration::from_millis(25)));
    let renderer = Arc::new(renderer(data_view(), plugins));

    let (first, second) = tokio::join!(
        renderer.render(RenderRequest::get("/cart")),
        renderer.render(RenderRequest::get("/cart")),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    let third = renderer.render(RenderRequest::get("/cart")).await.unwrap();

    assert_eq!(first.body, second.body);
    assert_eq!(first.body, third.body);
    assert_eq!(first.stats.render_count, third.stats.render_count);

    let other = renderer.render(RenderRequest::get("/orders")).await.unwrap();
    assert!(other.body.contains("<title>Shop | orders</title>"));
    assert!(!other.body.contains("Shop | cart"));
}

#[tokio::test]
async fn test_lazy_state_is_per_request() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&loads);
    let chart = Lazy::sync("widgets/chart.js", "./widgets/chart", move || {
        counted.fetch_add(1, Ordering::SeqCst);
        Markup::element("chart")
    })
    .into_element();
    let renderer = renderer(chart, PluginList::new());

    for _ in 0..2 {
        let result = renderer.render(RenderRequest::get("/")).await.unwrap();
        assert!(result.stats.preloaded_chunks.contains(&"chart.js-hash.js".to_string()));
    }
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

type Journal = Arc<Mutex<Vec<String>>>;

/// Logs every hook call. With `work` set it keeps one operation pending.
struct Recorder {
    name: &'static str,
    journal: Journal,
    work: Option<Duration>,
}

impl Recorder {
    fn log(&self, hook: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{hook}", self.name));
    }
}

impl Plugin for Recorder {
    type State = Option<PendingOperation>;

    fn name(&self) -> &str {
        self.name
    }

    fn create_state(&self, _context: &RenderContext) -> Result<Self::State, PluginError> {
        self.log("create_state");
        Ok(self.work.map(|delay| {
            PendingOperation::spawn("work", async move {
                tokio::time::sleep(delay).await;
                Ok(())
            })
        }))
    }

    fn decorate_app(&self, _state: &Self::State, app: Element) -> Result<Element, PluginError> {
        self.log("decorate_app");
        Ok(app)
    }

    fn should_abort_rendering(&self, _state: &Self::State) -> bool {
        self.log("should_abort_rendering");
        false
    }

    fn pending_operations(&self, state: &mut Self::State) -> Vec<PendingOperation> {
        self.log("pending_operations");
        state.iter().cloned().collect()
    }

    fn cancel_pending_operations(&self, _state: &mut Self::State) -> BoxFuture<'static, ()> {
        self.log("cancel_pending_operations");
        Box::pin(async {})
    }

    fn render_html(&self, _state: &mut Self::State, _document: &mut Document) -> Result<(), PluginError> {
        self.log("render_html");
        Ok(())
    }

    fn client_bootstrap_data(&self, _state: &Self::State) -> Option<Value> {
        self.log("client_bootstrap_data");
        None
    }
}

#[tokio::test(start_paused = true)]
async fn test_plugin_hooks_run_in_lifecycle_order() {
    let journal = Journal::default();
    let passes = Arc::clone(&journal);
    let root = component(move |_scope| {
        passes.lock().unwrap().push("pass".to_string());
        Ok("app".to_string())
    });
    let plugins = PluginList::new()
        .with(Recorder {
            name: "a",
            journal: Arc::clone(&journal),
            work: Some(Duration::from_millis(20)),
        })
        .with(Recorder {
            name: "b",
            journal: Arc::clone(&journal),
            work: None,
        });

    let result = renderer(root, plugins)
        .render(RenderRequest::get("/"))
        .await
        .unwrap();
    assert_eq!(result.stats.render_count, 2);
    assert_eq!(result.stats.stop_reason, StopReason::Settled);

    let between_passes = [
        "a:should_abort_rendering",
        "b:should_abort_rendering",
        "a:pending_operations",
        "b:pending_operations",
    ];
    let mut expected = vec![
        "a:create_state",
        "b:create_state",
        "a:decorate_app",
        "b:decorate_app",
        "pass",
    ];
    expected.extend(between_passes);
    expected.push("pass");
    expected.extend(between_passes);
    expected.extend([
        "a:cancel_pending_operations",
        "b:cancel_pending_operations",
        "a:render_html",
        "b:render_html",
        "a:client_bootstrap_data",
        "b:client_bootstrap_data",
    ]);
    assert_eq!(*journal.lock().unwrap(), expected);
}

/// Sets the flag when dropped.
struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn test_lazy_loads_are_stopped_before_render_returns() {
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stopped);
    let slow = Lazy::deferred("pages/reviews.js", "./pages/reviews", move || {
        let guard = SetOnDrop(Arc::clone(&flag));
        async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Markup::element("<ul>reviews</ul>"))
        }
    })
    .with_fallback(Markup::element("<p>loading reviews</p>"))
    .into_element();

    let result = renderer(slow, PluginList::new())
        .render(RenderRequest::get("/"))
        .await
        .unwrap();

    assert_eq!(result.stats.stop_reason, StopReason::Deadline);
    assert!(result.body.contains("<p>loading reviews</p>"));
    // The aborted load task has been torn down, not just signalled.
    assert!(stopped.load(Ordering::SeqCst));
}
