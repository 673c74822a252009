//! Per-request plugin orchestration.

use std::sync::Arc;

use futures_util::future::join_all;
use prerender_core::Document;
use serde_json::{Map, Value};

use crate::context::RenderContext;
use crate::error::Result;
use crate::operation::PendingOperation;
use crate::plugin::{Capabilities, ErasedPlugin, PluginList, PluginState};
use crate::view::Element;

struct Slot {
    plugin: Arc<dyn ErasedPlugin>,
    capabilities: Capabilities,
    state: PluginState,
}

/// Owns one state per plugin for a single request.
///
/// States live in a positional arena matching registration order. A host is
/// built for exactly one render call and dropped with it.
pub struct PluginHost {
    slots: Vec<Slot>,
}

impl PluginHost {
    /// Create every plugin's state, in order. The first failure aborts.
    pub fn new(plugins: &PluginList, context: &RenderContext) -> Result<Self> {
        let slots = plugins
            .iter()
            .map(|entry| -> Result<Slot> {
                let state = entry.plugin.create_state(context)?;
                Ok(Slot {
                    plugin: Arc::clone(&entry.plugin),
                    capabilities: entry.capabilities,
                    state,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { slots })
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.plugin.name()).collect()
    }

    /// Fold the tree through every plugin, left to right.
    pub fn decorate_app(&self, app: Element) -> Result<Element> {
        self.slots
            .iter()
            .filter(|slot| slot.capabilities.decorate_app)
            .try_fold(app, |app, slot| slot.plugin.decorate_app(&slot.state, app))
    }

    /// True if any plugin asks the loop to stop.
    pub fn should_abort_rendering(&self) -> Result<bool> {
        for slot in &self.slots {
            if slot.capabilities.should_abort_rendering
                && slot.plugin.should_abort_rendering(&slot.state)?
            {
                tracing::debug!(plugin = slot.plugin.name(), "plugin requested abort");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Unsettled operations across all plugins.
    pub fn pending_operations(&mut self) -> Result<Vec<PendingOperation>> {
        let mut pending = Vec::new();
        for slot in &mut self.slots {
            if !slot.capabilities.pending_operations {
                continue;
            }
            let operations = slot.plugin.pending_operations(&mut slot.state)?;
            pending.extend(operations.into_iter().filter(|op| !op.is_settled()));
        }
        Ok(pending)
    }

    /// Ask every plugin to stop its work and wait for all of them.
    pub async fn cancel_pending_operations(&mut self) -> Result<()> {
        let mut cancellations = Vec::new();
        for slot in &mut self.slots {
            if slot.capabilities.cancel_pending_operations {
                cancellations.push(slot.plugin.cancel_pending_operations(&mut slot.state)?);
            }
        }
        join_all(cancellations).await;
        Ok(())
    }

    pub fn render_html(&mut self, document: &mut Document) -> Result<()> {
        for slot in &mut self.slots {
            if slot.capabilities.render_html {
                slot.plugin.render_html(&mut slot.state, document)?;
            }
        }
        Ok(())
    }

    /// Bootstrap data keyed by plugin name. Plugins returning `None` are
    /// omitted.
    pub fn client_bootstrap_data(&self) -> Result<Map<String, Value>> {
        let mut data = Map::new();
        for slot in &self.slots {
            if !slot.capabilities.client_bootstrap_data {
                continue;
            }
            if let Some(value) = slot.plugin.client_bootstrap_data(&slot.state)? {
                data.insert(slot.plugin.name().to_string(), value);
            }
        }
        Ok(data)
    }
}
