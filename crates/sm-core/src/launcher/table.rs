use std::{collections::HashMap, sync::Arc};

use sm_model::{InstanceId, InstanceIdent};

use crate::{
    error::{CoreError, CoreResult},
    instance::Instance,
};

/// Bounded instance table.
pub(crate) struct InstanceTable {
    /// Instances indexed by ident.
    by_ident: HashMap<InstanceIdent, Arc<Instance>>,
    /// Index: instance ID -> ident, for runner callbacks.
    by_id: HashMap<InstanceId, InstanceIdent>,
    limit: usize,
}

impl InstanceTable {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            by_ident: HashMap::with_capacity(limit),
            by_id: HashMap::with_capacity(limit),
            limit,
        }
    }

    /// Adds an instance. Fails if the ident is taken or the table is full.
    pub(crate) fn insert(&mut self, instance: Arc<Instance>) -> CoreResult<()> {
        if self.by_ident.contains_key(instance.ident()) {
            return Err(CoreError::WrongState(format!("instance {} already exists", instance.ident())));
        }
        if self.by_ident.len() >= self.limit {
            return Err(CoreError::CapacityExceeded {
                what: "instances",
                limit: self.limit,
            });
        }

        self.by_id
            .insert(instance.id().to_string(), instance.ident().clone());
        self.by_ident.insert(instance.ident().clone(), instance);
        Ok(())
    }

    pub(crate) fn remove(&mut self, ident: &InstanceIdent) -> Option<Arc<Instance>> {
        let instance = self.by_ident.remove(ident)?;
        self.by_id.remove(instance.id());
        Some(instance)
    }

    pub(crate) fn get(&self, ident: &InstanceIdent) -> Option<&Arc<Instance>> {
        self.by_ident.get(ident)
    }

    pub(crate) fn get_by_id(&self, id: &str) -> Option<&Arc<Instance>> {
        self.by_id.get(id).and_then(|ident| self.by_ident.get(ident))
    }

    pub(crate) fn contains(&self, ident: &InstanceIdent) -> bool {
        self.by_ident.contains_key(ident)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.by_ident.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_ident.len()
    }
}
