use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use sm_model::{ServiceId, ServiceInfo};
use tracing::{debug, warn};

use super::Service;
use crate::{
    api::{OciManager, ServiceManager},
    error::{CoreError, CoreResult},
};

/// Outcome of [`ServiceCache::refresh`].
#[derive(Debug, Default)]
pub struct ServiceRefresh {
    /// Services (re)resolved during this pass.
    pub resolved: Vec<ServiceId>,
    /// Services dropped because nothing references them anymore.
    pub evicted: Vec<ServiceId>,
    /// Referenced services that could not be resolved.
    pub failed: HashMap<ServiceId, CoreError>,
}

/// Bounded set of resolved services, unique per service ID.
///
/// The cache owns the records; instances only hold weak references to them.
pub struct ServiceCache {
    services: HashMap<ServiceId, Arc<Service>>,
    limit: usize,
}

impl ServiceCache {
    pub fn new(limit: usize) -> Self {
        Self {
            services: HashMap::with_capacity(limit),
            limit,
        }
    }

    pub fn get(&self, service_id: &str) -> Option<&Arc<Service>> {
        self.services.get(service_id)
    }

    /// Returns `true` if the cached record has the same version fingerprint as `info`.
    pub fn is_current(&self, info: &ServiceInfo) -> bool {
        self.services
            .get(&info.service_id)
            .is_some_and(|s| s.version() == info.version.aos_version)
    }

    /// Inserts or replaces a record. Adding a new ID to a full cache fails.
    pub fn insert(&mut self, service: Service) -> CoreResult<Arc<Service>> {
        if !self.services.contains_key(service.service_id()) && self.services.len() >= self.limit {
            return Err(CoreError::CapacityExceeded {
                what: "services",
                limit: self.limit,
            });
        }

        let service = Arc::new(service);
        self.services
            .insert(service.service_id().to_string(), Arc::clone(&service));
        Ok(service)
    }

    pub fn remove(&mut self, service_id: &str) -> Option<Arc<Service>> {
        self.services.remove(service_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Brings the cache in line with the desired services.
    ///
    /// Services nobody references are evicted. Referenced services that are missing or whose
    /// version changed are installed one by one and resolved again, so a failing install only
    /// affects its own service. Per-service failures are collected in
    /// [`ServiceRefresh::failed`]; only running out of cache slots is returned as an error.
    pub fn refresh(
        &mut self,
        desired: &[ServiceInfo],
        referenced: &HashSet<&str>,
        manager: &dyn ServiceManager,
        oci: &dyn OciManager,
    ) -> CoreResult<ServiceRefresh> {
        let mut out = ServiceRefresh::default();

        let evicted: Vec<ServiceId> = self
            .services
            .keys()
            .filter(|id| !referenced.contains(id.as_str()))
            .cloned()
            .collect();
        for id in evicted {
            self.services.remove(&id);
            debug!(service = %id, "service evicted from cache");
            out.evicted.push(id);
        }

        let mut by_id: HashMap<&str, &ServiceInfo> = HashMap::with_capacity(desired.len());
        for info in desired {
            by_id.entry(info.service_id.as_str()).or_insert(info);
        }

        let mut stale: Vec<ServiceInfo> = Vec::new();
        for id in referenced {
            match by_id.get(id) {
                Some(info) if !self.is_current(info) => stale.push((*info).clone()),
                Some(_) => {}
                None if self.services.contains_key(*id) => {}
                None => {
                    out.failed.insert(
                        id.to_string(),
                        CoreError::NotFound(format!("service {id} is not provided")),
                    );
                }
            }
        }

        for info in stale {
            if let Err(e) = manager.install_services(std::slice::from_ref(&info)) {
                warn!(service = %info.service_id, error = %e, "failed to install service");
                self.services.remove(&info.service_id);
                out.failed.insert(info.service_id, e);
                continue;
            }

            match Service::resolve(manager, oci, &info.service_id) {
                Ok(service) => {
                    if service.version() != info.version.aos_version {
                        warn!(
                            service = %info.service_id,
                            expected = info.version.aos_version,
                            installed = service.version(),
                            "installed service version differs from desired"
                        );
                    }
                    debug!(service = %service, "service resolved");
                    self.insert(service)?;
                    out.resolved.push(info.service_id);
                }
                Err(e) => {
                    warn!(service = %info.service_id, error = %e, "failed to resolve service");
                    self.services.remove(&info.service_id);
                    out.failed.insert(info.service_id, e);
                }
            }
        }

        Ok(out)
    }
}
