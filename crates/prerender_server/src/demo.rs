//! Demo application and plugins served when no build output is supplied.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::future::BoxFuture;
use prerender::{
    component, Document, Element, Lazy, Markup, PendingOperation, Plugin, PluginError,
    PluginList, Provider, RenderContext,
};
use prerender_core::markup::escape_html;
use serde_json::{json, Value};

pub const ENTRYPOINT: &str = "src/main.tsx";

pub const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Prerender</title>
  </head>
  <body>
    <div id="root"></div>
  </body>
</html>
"#;

pub const MANIFEST: &str = r#"{
  "src/main.tsx": {
    "file": "assets/main-4f2a91.js",
    "imports": ["src/layout.tsx"],
    "css": ["assets/main-9c1d07.css"]
  },
  "src/layout.tsx": {
    "file": "assets/layout-77e0b2.js"
  },
  "src/widgets/stats.tsx": {
    "file": "assets/stats-1b3c5e.js",
    "imports": ["src/layout.tsx"],
    "css": ["assets/stats-d41f88.css"]
  }
}"#;

/// Greeting produced by [`GreetingPlugin`] once its lookup finishes.
#[derive(Debug, Default)]
pub struct Greeting {
    message: OnceLock<String>,
}

impl Greeting {
    pub fn message(&self) -> Option<&str> {
        self.message.get().map(String::as_str)
    }
}

/// Demo page: a greeting filled in by a plugin and a lazily loaded widget.
pub fn root() -> Element {
    let stats = Lazy::sync("src/widgets/stats.tsx", "./widgets/stats", || {
        component(|scope| {
            Ok(format!(
                "<aside>Rendered for {}</aside>",
                escape_html(scope.request().route())
            ))
        })
    })
    .with_fallback(Markup::element("<aside>Loading stats...</aside>"))
    .into_element();

    component(move |scope| {
        let heading = scope
            .use_context::<Greeting>()
            .and_then(|greeting| greeting.message().map(str::to_string))
            .unwrap_or_else(|| "Loading...".to_string());

        Ok(format!(
            "<main><h1>{}</h1>{}</main>",
            escape_html(&heading),
            scope.render(&stats)?
        ))
    })
}

/// Plugins registered by the demo host, in order.
pub fn plugins(greeting_delay: Duration) -> PluginList {
    PluginList::new()
        .with(TitlePlugin)
        .with(GreetingPlugin::new(greeting_delay))
}

/// Sets the document title and route attribute.
pub struct TitlePlugin;

impl Plugin for TitlePlugin {
    type State = String;

    fn name(&self) -> &str {
        "title"
    }

    fn create_state(&self, context: &RenderContext) -> Result<String, PluginError> {
        Ok(context.request().route().to_string())
    }

    fn render_html(&self, route: &mut String, document: &mut Document) -> Result<(), PluginError> {
        document.set_title(format!("Prerender | {route}"));
        document.set_html_attr("data-route", route.as_str());
        document.add_meta("generator", "prerender");
        Ok(())
    }
}

/// Looks up a greeting asynchronously, simulating a data fetch.
pub struct GreetingPlugin {
    delay: Duration,
}

impl GreetingPlugin {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

pub struct GreetingState {
    greeting: Arc<Greeting>,
    lookup: PendingOperation,
    rendered_at: String,
}

impl Plugin for GreetingPlugin {
    type State = GreetingState;

    fn name(&self) -> &str {
        "greeting"
    }

    fn create_state(&self, context: &RenderContext) -> Result<GreetingState, PluginError> {
        let greeting = Arc::new(Greeting::default());
        let target = Arc::clone(&greeting);
        let route = context.request().route().to_string();
        let delay = self.delay;

        let lookup = PendingOperation::spawn("greeting", async move {
            tokio::time::sleep(delay).await;
            target
                .message
                .set(format!("Hello from {route}"))
                .map_err(|_| "greeting already set".to_string())
        });

        Ok(GreetingState {
            greeting,
            lookup,
            rendered_at: context.received_at().to_rfc3339(),
        })
    }

    fn decorate_app(&self, state: &GreetingState, app: Element) -> Result<Element, PluginError> {
        Ok(Provider::element(Arc::clone(&state.greeting), app))
    }

    fn pending_operations(&self, state: &mut GreetingState) -> Vec<PendingOperation> {
        vec![state.lookup.clone()]
    }

    fn cancel_pending_operations(&self, state: &mut GreetingState) -> BoxFuture<'static, ()> {
        state.lookup.cancel();
        let wait = state.lookup.wait();
        Box::pin(async move {
            wait.await;
        })
    }

    fn client_bootstrap_data(&self, state: &GreetingState) -> Option<Value> {
        Some(json!({
            "message": state.greeting.message(),
            "renderedAt": state.rendered_at,
        }))
    }
}
