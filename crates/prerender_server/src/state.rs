use std::sync::Arc;

use prerender::ServerRenderer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub renderer: Arc<ServerRenderer>,
}

impl AppState {
    pub fn new(renderer: ServerRenderer) -> Self {
        Self {
            renderer: Arc::new(renderer),
        }
    }
}
