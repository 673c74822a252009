//! Plugin contract.
//!
//! A plugin is a stateless descriptor registered once on the renderer. Per
//! request it creates a state value which is threaded through every later
//! hook for that request. All hooks except [`Plugin::create_state`] have
//! no-op defaults; [`Capabilities`] tells the host which ones to call. They
//! are read once, when the plugin is pushed onto a [`PluginList`], and the
//! cached value is used for every request.

use std::any::Any;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use prerender_core::Document;
use serde_json::Value;

use crate::context::RenderContext;
use crate::error::{PluginError, RenderError, Result};
use crate::operation::PendingOperation;
use crate::view::Element;

/// Hooks a plugin implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub decorate_app: bool,
    pub should_abort_rendering: bool,
    pub pending_operations: bool,
    pub cancel_pending_operations: bool,
    pub render_html: bool,
    pub client_bootstrap_data: bool,
}

impl Capabilities {
    pub const ALL: Self = Self {
        decorate_app: true,
        should_abort_rendering: true,
        pending_operations: true,
        cancel_pending_operations: true,
        render_html: true,
        client_bootstrap_data: true,
    };

    pub const NONE: Self = Self {
        decorate_app: false,
        should_abort_rendering: false,
        pending_operations: false,
        cancel_pending_operations: false,
        render_html: false,
        client_bootstrap_data: false,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::ALL
    }
}

/// A render plugin.
///
/// Hooks are called in this order for each request, never concurrently:
/// `create_state`, `decorate_app`, then `should_abort_rendering` and
/// `pending_operations` between passes, then `cancel_pending_operations`,
/// `render_html` and `client_bootstrap_data` once after the loop.
pub trait Plugin: Send + Sync + 'static {
    type State: Send + 'static;

    /// Unique name. Also the key of this plugin's bootstrap data.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn create_state(&self, context: &RenderContext) -> std::result::Result<Self::State, PluginError>;

    /// Wrap the tree produced by the previous plugin.
    fn decorate_app(
        &self,
        _state: &Self::State,
        app: Element,
    ) -> std::result::Result<Element, PluginError> {
        Ok(app)
    }

    fn should_abort_rendering(&self, _state: &Self::State) -> bool {
        false
    }

    /// Work the next pass should wait for. Settled handles are ignored.
    fn pending_operations(&self, _state: &mut Self::State) -> Vec<PendingOperation> {
        Vec::new()
    }

    /// Stop any work this plugin started. Awaited once the loop ends.
    fn cancel_pending_operations(&self, _state: &mut Self::State) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }

    fn render_html(
        &self,
        _state: &mut Self::State,
        _document: &mut Document,
    ) -> std::result::Result<(), PluginError> {
        Ok(())
    }

    fn client_bootstrap_data(&self, _state: &Self::State) -> Option<Value> {
        None
    }
}

pub(crate) type PluginState = Box<dyn Any + Send>;

/// Object-safe view of a [`Plugin`] with its state type erased.
pub(crate) trait ErasedPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn create_state(&self, context: &RenderContext) -> Result<PluginState>;
    fn decorate_app(&self, state: &PluginState, app: Element) -> Result<Element>;
    fn should_abort_rendering(&self, state: &PluginState) -> Result<bool>;
    fn pending_operations(&self, state: &mut PluginState) -> Result<Vec<PendingOperation>>;
    fn cancel_pending_operations(&self, state: &mut PluginState) -> Result<BoxFuture<'static, ()>>;
    fn render_html(&self, state: &mut PluginState, document: &mut Document) -> Result<()>;
    fn client_bootstrap_data(&self, state: &PluginState) -> Result<Option<Value>>;
}

impl<P: Plugin> ErasedPlugin for P {
    fn name(&self) -> &str {
        Plugin::name(self)
    }

    fn create_state(&self, context: &RenderContext) -> Result<PluginState> {
        let state = Plugin::create_state(self, context)
            .map_err(|e| hook_error(self, "create_state", e))?;
        Ok(Box::new(state))
    }

    fn decorate_app(&self, state: &PluginState, app: Element) -> Result<Element> {
        Plugin::decorate_app(self, downcast(self, state)?, app)
            .map_err(|e| hook_error(self, "decorate_app", e))
    }

    fn should_abort_rendering(&self, state: &PluginState) -> Result<bool> {
        Ok(Plugin::should_abort_rendering(self, downcast(self, state)?))
    }

    fn pending_operations(&self, state: &mut PluginState) -> Result<Vec<PendingOperation>> {
        Ok(Plugin::pending_operations(self, downcast_mut(self, state)?))
    }

    fn cancel_pending_operations(&self, state: &mut PluginState) -> Result<BoxFuture<'static, ()>> {
        Ok(Plugin::cancel_pending_operations(self, downcast_mut(self, state)?))
    }

    fn render_html(&self, state: &mut PluginState, document: &mut Document) -> Result<()> {
        Plugin::render_html(self, downcast_mut(self, state)?, document)
            .map_err(|e| hook_error(self, "render_html", e))
    }

    fn client_bootstrap_data(&self, state: &PluginState) -> Result<Option<Value>> {
        Ok(Plugin::client_bootstrap_data(self, downcast(self, state)?))
    }
}

fn hook_error<P: Plugin>(plugin: &P, hook: &'static str, error: PluginError) -> RenderError {
    RenderError::Plugin {
        plugin: Plugin::name(plugin).to_string(),
        hook,
        reason: error.to_string(),
    }
}

fn downcast<'s, P: Plugin>(plugin: &P, state: &'s PluginState) -> Result<&'s P::State> {
    state
        .downcast_ref::<P::State>()
        .ok_or_else(|| RenderError::StateMismatch {
            plugin: Plugin::name(plugin).to_string(),
        })
}

fn downcast_mut<'s, P: Plugin>(plugin: &P, state: &'s mut PluginState) -> Result<&'s mut P::State> {
    state
        .downcast_mut::<P::State>()
        .ok_or_else(|| RenderError::StateMismatch {
            plugin: Plugin::name(plugin).to_string(),
        })
}

/// A plugin with the capabilities it reported when registered.
#[derive(Clone)]
pub(crate) struct Registered {
    pub(crate) plugin: Arc<dyn ErasedPlugin>,
    pub(crate) capabilities: Capabilities,
}

/// Ordered list of plugins registered on a renderer.
#[derive(Clone, Default)]
pub struct PluginList {
    plugins: Vec<Registered>,
}

impl PluginList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<P: Plugin>(&mut self, plugin: P) {
        let capabilities = Plugin::capabilities(&plugin);
        self.plugins.push(Registered {
            plugin: Arc::new(plugin),
            capabilities,
        });
    }

    pub fn with<P: Plugin>(mut self, plugin: P) -> Self {
        self.push(plugin);
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|entry| entry.plugin.name()).collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Registered> {
        self.plugins.iter()
    }
}

impl std::fmt::Debug for PluginList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use prerender_core::RenderRequest;
    use serde_json::json;

    use super::*;
    use crate::context::RenderMode;
    use crate::view::Markup;

    struct Counter;

    impl Plugin for Counter {
        type State = u32;

        fn name(&self) -> &str {
            "counter"
        }

        fn create_state(&self, _context: &RenderContext) -> std::result::Result<u32, PluginError> {
            Ok(7)
        }

        fn client_bootstrap_data(&self, state: &u32) -> Option<Value> {
            Some(json!({ "count": state }))
        }
    }

    struct Broken;

    impl Plugin for Broken {
        type State = ();

        fn name(&self) -> &str {
            "broken"
        }

        fn create_state(&self, _context: &RenderContext) -> std::result::Result<(), PluginError> {
            Err(PluginError::new("missing session"))
        }
    }

    fn context() -> RenderContext {
        RenderContext::new(
            RenderRequest::get("/"),
            Duration::from_millis(100),
            RenderMode::Server,
        )
    }

    #[test]
    fn test_erased_plugin_threads_state() {
        let plugin: Arc<dyn ErasedPlugin> = Arc::new(Counter);
        let state = plugin.create_state(&context()).unwrap();

        assert_eq!(
            plugin.client_bootstrap_data(&state).unwrap(),
            Some(json!({ "count": 7 }))
        );
        assert!(!plugin.should_abort_rendering(&state).unwrap());
        let input = Markup::element("x");
        let app = plugin.decorate_app(&state, input.clone()).unwrap();
        assert!(Arc::ptr_eq(&input, &app));
    }

    #[test]
    fn test_create_state_error_names_plugin_and_hook() {
        let plugin: Arc<dyn ErasedPlugin> = Arc::new(Broken);
        let error = plugin.create_state(&context()).unwrap_err();

        assert!(matches!(
            &error,
            RenderError::Plugin { plugin, hook: "create_state", reason }
                if plugin == "broken" && reason == "missing session"
        ));
    }

    #[test]
    fn test_wrong_state_type_is_reported() {
        let plugin: Arc<dyn ErasedPlugin> = Arc::new(Counter);
        let state: PluginState = Box::new("not a counter");

        assert!(matches!(
            plugin.client_bootstrap_data(&state),
            Err(RenderError::StateMismatch { plugin }) if plugin == "counter"
        ));
    }

    #[test]
    fn test_plugin_list_keeps_registration_order() {
        let list = PluginList::new().with(Counter).with(Broken);
        assert_eq!(list.len(), 2);
        assert_eq!(list.names(), vec!["counter", "broken"]);
        assert_eq!(format!("{list:?}"), r#"["counter", "broken"]"#);
        assert_eq!(Plugin::capabilities(&Counter), Capabilities::ALL);
    }

    struct Quiet(Arc<AtomicUsize>);

    impl Plugin for Quiet {
        type State = ();

        fn name(&self) -> &str {
            "quiet"
        }

        fn capabilities(&self) -> Capabilities {
            self.0.fetch_add(1, Ordering::SeqCst);
            Capabilities::NONE
        }

        fn create_state(&self, _context: &RenderContext) -> std::result::Result<(), PluginError> {
            Ok(())
        }
    }

    #[test]
    fn test_capabilities_read_once_on_push() {
        let calls = Arc::new(AtomicUsize::new(0));
        let list = PluginList::new().with(Quiet(Arc::clone(&calls))).with(Counter);
        let copy = list.clone();

        let cached: Vec<_> = copy.iter().map(|entry| entry.capabilities).collect();
        assert_eq!(cached, vec![Capabilities::NONE, Capabilities::ALL]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
