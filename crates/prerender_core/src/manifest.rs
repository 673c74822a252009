//! Build-time asset manifest and import-graph resolution.
//!
//! The manifest maps a logical module path (the key the bundler used) to the
//! hashed file it was emitted as, plus the logical paths it statically
//! imports. It is built once and only read afterwards, so a single instance
//! can be shared behind an `Arc` by every in-flight request.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Physical (hashed) output path.
    pub file: String,
    /// Logical paths this module statically imports, in source order.
    #[serde(default)]
    pub imports: Vec<String>,
    /// Stylesheets emitted for this module.
    #[serde(default)]
    pub css: Vec<String>,
}

impl ManifestEntry {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            imports: Vec::new(),
            css: Vec::new(),
        }
    }

    pub fn with_imports(mut self, imports: &[&str]) -> Self {
        self.imports.extend(imports.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_css(mut self, css: &[&str]) -> Self {
        self.css.extend(css.iter().map(|s| s.to_string()));
        self
    }
}

/// Immutable map from logical path to build output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest {
    entries: HashMap<String, ManifestEntry>,
}

impl AssetManifest {
    /// Build a manifest from `(logical path, entry)` pairs.
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ManifestEntry)>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Parse the bundler's JSON manifest.
    ///
    /// ```json
    /// { "app.js": { "file": "app-3f2a.js", "imports": ["layout.js"], "css": ["app-77c1.css"] } }
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::ManifestParse(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, logical_path: &str) -> bool {
        self.entries.contains_key(logical_path)
    }

    /// Translate a logical path into its physical output path.
    ///
    /// An unknown path is a build or configuration defect and always fails;
    /// no fallback name is guessed.
    pub fn translate_path(&self, logical_path: &str) -> Result<&str> {
        self.lookup(logical_path).map(|(_, entry)| entry.file.as_str())
    }

    /// Physical paths of `logical_path` and everything it transitively
    /// imports, each listed once, dependencies before their dependents.
    pub fn list_dependencies(&self, logical_path: &str) -> Result<Vec<String>> {
        self.resolve_preloads([logical_path])
    }

    /// Same as [`list_dependencies`](Self::list_dependencies) over several
    /// roots, sharing one seen-set so the union is deduplicated and stays
    /// dependency-first across roots.
    pub fn resolve_preloads<'r, I>(&self, roots: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'r str>,
    {
        Ok(self
            .post_order(roots)?
            .into_iter()
            .map(|entry| entry.file.clone())
            .collect())
    }

    /// Stylesheets of every module reachable from `roots`, deduplicated, in
    /// the same dependency-first order as the module preloads.
    pub fn list_stylesheets<'r, I>(&self, roots: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'r str>,
    {
        let mut seen = HashSet::new();
        Ok(self
            .post_order(roots)?
            .into_iter()
            .flat_map(|entry| entry.css.iter())
            .filter(|css| seen.insert(css.as_str()))
            .cloned()
            .collect())
    }

    fn lookup(&self, logical_path: &str) -> Result<(&String, &ManifestEntry)> {
        self.entries
            .get_key_value(logical_path)
            .ok_or_else(|| CoreError::ManifestLookup {
                path: logical_path.to_string(),
            })
    }

    /// Depth-first post-order walk of the import graph.
    ///
    /// Iterative so deep graphs cannot overflow the stack. Every logical path
    /// is visited at most once, which also breaks import cycles.
    fn post_order<'r, I>(&self, roots: I) -> Result<Vec<&ManifestEntry>>
    where
        I: IntoIterator<Item = &'r str>,
    {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut order = Vec::new();

        for root in roots {
            let (key, entry) = self.lookup(root)?;
            if !seen.insert(key.as_str()) {
                continue;
            }

            let mut stack: Vec<(&ManifestEntry, usize)> = vec![(entry, 0)];
            while let Some(frame) = stack.last_mut() {
                let current = frame.0;
                match current.imports.get(frame.1) {
                    Some(import) => {
                        frame.1 += 1;
                        let (key, child) = self.lookup(import)?;
                        if seen.insert(key.as_str()) {
                            stack.push((child, 0));
                        }
                    }
                    None => {
                        order.push(current);
                        stack.pop();
                    }
                }
            }
        }

        Ok(order)
    }
}
