//! Pure prerender logic - no I/O, no async, no side effects.
//!
//! This crate provides:
//! - `AssetManifest` - logical-path → build output map with dependency-first
//!   import graph traversal
//! - `DocumentTemplate` / `Document` - template parsed once, cloned per request
//! - `RenderRequest` / `Headers` - read-only request value
//! - `RendererConfig` - validated renderer settings
//! - Markup helpers for preload hints and the hydration script
//!
//! # Example
//!
//! ```
//! use prerender_core::{AssetManifest, ManifestEntry};
//!
//! let manifest = AssetManifest::from_entries([
//!     ("app.js", ManifestEntry::new("app.js-hash.js").with_imports(&["layout.js"])),
//!     ("layout.js", ManifestEntry::new("layout.js-hash.js").with_imports(&["ui.js"])),
//!     ("ui.js", ManifestEntry::new("ui.js-hash.js")),
//! ]);
//!
//! assert_eq!(
//!     manifest.list_dependencies("app.js").unwrap(),
//!     vec!["ui.js-hash.js", "layout.js-hash.js", "app.js-hash.js"],
//! );
//! ```

mod config;
mod document;
mod error;
mod manifest;
pub mod markup;
mod request;

pub use config::{RendererConfig, DEFAULT_DEADLINE_MS, DEFAULT_MAX_ITERATIONS};
pub use document::{Document, DocumentTemplate};
pub use error::{CoreError, Result};
pub use manifest::{AssetManifest, ManifestEntry};
pub use request::{Headers, RenderRequest};
