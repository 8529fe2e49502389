use std::collections::HashMap;

use sm_model::LayerInfo;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LayerRefresh {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Bounded set of known layers keyed by layer ID.
pub struct LayerCache {
    layers: HashMap<String, LayerInfo>,
    limit: usize,
}

impl LayerCache {
    pub fn new(limit: usize) -> Self {
        Self {
            layers: HashMap::with_capacity(limit),
            limit,
        }
    }

    /// Replaces the cached set with `desired`, keeping unchanged entries.
    pub fn refresh(&mut self, desired: &[LayerInfo]) -> CoreResult<LayerRefresh> {
        if desired.len() > self.limit {
            return Err(CoreError::CapacityExceeded {
                what: "layers",
                limit: self.limit,
            });
        }

        let mut out = LayerRefresh::default();

        let before = self.layers.len();
        self.layers
            .retain(|id, _| desired.iter().any(|l| &l.layer_id == id));
        out.removed = before - self.layers.len();

        for layer in desired {
            match self.layers.get(&layer.layer_id) {
                Some(cached) if cached.digest == layer.digest && cached.version == layer.version => {}
                Some(_) => {
                    out.updated += 1;
                    self.layers.insert(layer.layer_id.clone(), layer.clone());
                }
                None => {
                    out.added += 1;
                    self.layers.insert(layer.layer_id.clone(), layer.clone());
                }
            }
        }

        if out != LayerRefresh::default() {
            debug!(added = out.added, updated = out.updated, removed = out.removed, "layers refreshed");
        }
        Ok(out)
    }

    pub fn get(&self, layer_id: &str) -> Option<&LayerInfo> {
        self.layers.get(layer_id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
