//! The view-layer seam: components render synchronously to markup.
//!
//! The renderer only ever asks the composed tree for a markup string. A
//! tree is an [`Element`], a shared [`Component`] trait object, so plugins
//! can wrap whatever they are handed without knowing its concrete type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use prerender_core::RenderRequest;

use crate::chunks::ChunkManager;
use crate::context::RenderContext;
use crate::error::ViewError;

/// A node of the component tree.
pub type Element = Arc<dyn Component>;

/// Something that renders to markup.
///
/// Rendering must be synchronous and free of side effects apart from
/// reading provided context and resolving lazy references through the
/// scope's [`ChunkManager`].
pub trait Component: Send + Sync {
    fn render(&self, scope: &mut RenderScope<'_>) -> Result<String, ViewError>;
}

impl<F> Component for F
where
    F: Fn(&mut RenderScope<'_>) -> Result<String, ViewError> + Send + Sync,
{
    fn render(&self, scope: &mut RenderScope<'_>) -> Result<String, ViewError> {
        self(scope)
    }
}

/// Wrap a closure as an [`Element`].
pub fn component<F>(render: F) -> Element
where
    F: Fn(&mut RenderScope<'_>) -> Result<String, ViewError> + Send + Sync + 'static,
{
    Arc::new(render)
}

/// Fixed markup.
#[derive(Debug, Clone)]
pub struct Markup(String);

impl Markup {
    pub fn element(html: impl Into<String>) -> Element {
        Arc::new(Self(html.into()))
    }
}

impl Component for Markup {
    fn render(&self, _scope: &mut RenderScope<'_>) -> Result<String, ViewError> {
        Ok(self.0.clone())
    }
}

/// Makes a value available to everything rendered beneath it.
pub struct Provider<T> {
    value: Arc<T>,
    child: Element,
}

impl<T: Any + Send + Sync> Provider<T> {
    pub fn element(value: Arc<T>, child: Element) -> Element {
        Arc::new(Self { value, child })
    }
}

impl<T: Any + Send + Sync> Component for Provider<T> {
    fn render(&self, scope: &mut RenderScope<'_>) -> Result<String, ViewError> {
        let value: Arc<dyn Any + Send + Sync> = self.value.clone();
        scope.with_provided(TypeId::of::<T>(), value, |scope| scope.render(&self.child))
    }
}

/// State available to components during one render pass.
pub struct RenderScope<'a> {
    context: &'a RenderContext,
    chunks: &'a mut ChunkManager,
    provided: HashMap<TypeId, Vec<Arc<dyn Any + Send + Sync>>>,
}

impl<'a> RenderScope<'a> {
    pub fn new(context: &'a RenderContext, chunks: &'a mut ChunkManager) -> Self {
        Self {
            context,
            chunks,
            provided: HashMap::new(),
        }
    }

    pub fn context(&self) -> &RenderContext {
        self.context
    }

    pub fn request(&self) -> &RenderRequest {
        self.context.request()
    }

    pub fn chunks(&mut self) -> &mut ChunkManager {
        &mut *self.chunks
    }

    /// Render a child element in this scope.
    pub fn render(&mut self, element: &Element) -> Result<String, ViewError> {
        element.render(self)
    }

    /// Nearest value of type `T` provided by an enclosing [`Provider`].
    pub fn use_context<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.provided
            .get(&TypeId::of::<T>())
            .and_then(|stack| stack.last())
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    fn with_provided<R>(
        &mut self,
        key: TypeId,
        value: Arc<dyn Any + Send + Sync>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.provided.entry(key).or_default().push(value);
        let result = f(self);
        if let Some(stack) = self.provided.get_mut(&key) {
            stack.pop();
        }
        result
    }
}
