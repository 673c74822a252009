//! Deadline-bounded server rendering - Imperative Shell.
//!
//! This crate drives the render loop using the pure pieces from
//! `prerender_core`. It owns everything that awaits: plugin operations,
//! lazy chunk loads and the deadline race between render passes.
//!
//! # Architecture
//!
//! - **Functional Core** (`prerender_core`): manifest graph, document template, config
//! - **Imperative Shell** (this crate): plugin lifecycle, lazy registry, render loop
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use prerender::{Markup, PluginList, RenderRequest, RendererConfig, ServerRenderer};
//! use prerender_core::AssetManifest;
//!
//! let manifest = AssetManifest::from_json(&std::fs::read_to_string("dist/manifest.json")?)?;
//! let renderer = ServerRenderer::new(
//!     Markup::element("<h1>Hello</h1>"),
//!     &std::fs::read_to_string("index.html")?,
//!     Arc::new(manifest),
//!     PluginList::new(),
//!     RendererConfig::with_defaults("src/main.tsx")?,
//! )?;
//!
//! let result = renderer.render(RenderRequest::get("/")).await?;
//! println!("{} passes in {:?}", result.stats.render_count, result.stats.latency);
//! ```

mod chunks;
mod context;
mod error;
mod host;
mod operation;
mod plugin;
mod renderer;
mod view;

// Re-export core types for convenience
pub use prerender_core::{
    AssetManifest, CoreError, Document, DocumentTemplate, Headers, ManifestEntry, RenderRequest,
    RendererConfig,
};

// Export shell types
pub use chunks::{ChunkManager, Lazy, LazyLoader, LoadState, TouchedChunk};
pub use context::{RenderContext, RenderMode};
pub use error::{sanitize_error, PluginError, RenderError, RenderIssue, Result, ViewError};
pub use host::PluginHost;
pub use operation::{OperationOutcome, PendingOperation};
pub use plugin::{Capabilities, Plugin, PluginList};
pub use renderer::{RenderOptions, RenderResult, RenderStats, ServerRenderer, StopReason};
pub use view::{component, Component, Element, Markup, Provider, RenderScope};
