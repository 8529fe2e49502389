//! Reconciliation engine: converges the active instance set to the desired one.

mod job;
mod status;
mod table;

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use sm_model::{InstanceIdent, InstanceInfo, InstanceState, LayerInfo, RunStatus, RunnerStatus, ServiceInfo};
use tracing::{debug, error, info, instrument, warn};

use self::{job::LaunchJob, status::StatusDispatcher, table::InstanceTable};
use crate::{
    api::{OciManager, RunStatusReceiver, Runner, ServiceManager, StatusReceiver, Storage},
    config::LauncherConfig,
    error::{CoreError, CoreResult},
    instance::{Instance, SpecContext},
    pool::WorkerPool,
    service::{LayerCache, ServiceCache},
};

/// External capabilities the launcher drives.
#[derive(Clone)]
pub struct Collaborators {
    pub service_manager: Arc<dyn ServiceManager>,
    pub runner: Arc<dyn Runner>,
    pub oci: Arc<dyn OciManager>,
    pub storage: Arc<dyn Storage>,
    pub status_receiver: Arc<dyn StatusReceiver>,
}

struct LauncherState {
    instances: InstanceTable,
    services: ServiceCache,
    layers: LayerCache,
    in_progress: bool,
}

/// Pending storage writes of one reconciliation.
#[derive(Default)]
struct StorageDelta {
    added: Vec<InstanceInfo>,
    updated: Vec<InstanceInfo>,
    removed: Vec<InstanceIdent>,
}

/// Launcher: the single owner of the instance table and service cache.
///
/// Only one reconciliation runs at a time. Start and stop work is fanned out to a fixed pool of
/// `cooperate-launch` workers; all stops of a pass are drained before the first start is queued.
pub struct Launcher {
    config: LauncherConfig,
    ctx: Arc<SpecContext>,
    state: Mutex<LauncherState>,
    pool: WorkerPool<LaunchJob>,
    status: StatusDispatcher,
    deps: Collaborators,
}

impl Launcher {
    /// Creates the launcher and starts its worker and status threads.
    pub fn new(config: LauncherConfig, deps: Collaborators) -> CoreResult<Self> {
        let pool = WorkerPool::new(config.pool_config());
        pool.start()?;

        let status = StatusDispatcher::spawn(Arc::clone(&deps.status_receiver), config.status_queue)?;

        info!(
            workers = config.workers,
            max_instances = config.max_instances,
            runtime_dir = %config.runtime_dir.display(),
            "launcher started"
        );

        Ok(Self {
            ctx: Arc::new(SpecContext::new()),
            state: Mutex::new(LauncherState {
                instances: InstanceTable::new(config.max_instances),
                services: ServiceCache::new(config.max_services),
                layers: LayerCache::new(config.max_layers),
                in_progress: false,
            }),
            pool,
            status,
            config,
            deps,
        })
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Converges the active instances to `instances`.
    ///
    /// Per-instance failures only show up in the delivered statuses. A call-level error means the
    /// pass was rejected (`WrongState`) or hit a capacity limit.
    #[instrument(
        level = "info",
        skip_all,
        fields(services = services.len(), layers = layers.len(), instances = instances.len(), force_restart = force_restart)
    )]
    pub fn run_instances(
        &self,
        services: &[ServiceInfo],
        layers: &[LayerInfo],
        instances: &[InstanceInfo],
        force_restart: bool,
    ) -> CoreResult<()> {
        let _pass = self.begin_pass()?;

        let statuses = self.reconcile(services, layers, instances, force_restart)?;

        if let Err(e) = self.deps.status_receiver.instances_run_status(&statuses) {
            error!(error = %e, "failed to deliver run status");
        }
        Ok(())
    }

    /// Restores the instances recorded in storage, typically right after startup.
    #[instrument(level = "info", skip(self))]
    pub fn run_last_instances(&self) -> CoreResult<()> {
        let instances = self.deps.storage.get_all_instances()?;
        let referenced: HashSet<&str> = instances.iter().map(InstanceInfo::service_id).collect();

        let services: Vec<ServiceInfo> = self
            .deps
            .service_manager
            .get_all_services()?
            .iter()
            .filter(|s| referenced.contains(s.service_id.as_str()))
            .map(ServiceInfo::from)
            .collect();

        info!(instances = instances.len(), services = services.len(), "restoring last instances");
        self.run_instances(&services, &[], &instances, false)
    }

    /// Current status of every instance in the table, ordered by ident.
    pub fn statuses(&self) -> Vec<RunStatus> {
        let state = self.lock();
        let mut out: Vec<RunStatus> = state.instances.iter().map(|i| i.status()).collect();
        out.sort_by(|a, b| a.ident.cmp(&b.ident));
        out
    }

    /// Stops the worker pool and the status thread. Running instances are left to the runner.
    pub fn shutdown(&self) -> CoreResult<()> {
        let discarded = self.pool.shutdown()?;
        self.status.shutdown();
        info!(discarded, "launcher stopped");
        Ok(())
    }

    fn reconcile(
        &self,
        services: &[ServiceInfo],
        layers: &[LayerInfo],
        instances: &[InstanceInfo],
        force_restart: bool,
    ) -> CoreResult<Vec<RunStatus>> {
        if services.len() > self.config.max_services {
            return Err(CoreError::CapacityExceeded {
                what: "services",
                limit: self.config.max_services,
            });
        }

        let desired = dedup(instances);
        if desired.len() > self.config.max_instances {
            return Err(CoreError::CapacityExceeded {
                what: "instances",
                limit: self.config.max_instances,
            });
        }
        let desired_by_ident: HashMap<&InstanceIdent, &InstanceInfo> =
            desired.iter().map(|info| (&info.ident, *info)).collect();
        let referenced: HashSet<&str> = desired.iter().map(|info| info.service_id()).collect();

        let mut delta = StorageDelta::default();

        let (stops, failed_services) = {
            let mut state = self.lock();
            let refresh = state.services.refresh(
                services,
                &referenced,
                self.deps.service_manager.as_ref(),
                self.deps.oci.as_ref(),
            )?;
            state.layers.refresh(layers)?;

            if !refresh.resolved.is_empty() || !refresh.evicted.is_empty() || !refresh.failed.is_empty() {
                debug!(
                    resolved = refresh.resolved.len(),
                    evicted = refresh.evicted.len(),
                    failed = refresh.failed.len(),
                    "service cache refreshed"
                );
            }

            let mut stops = Vec::new();
            for instance in state.instances.iter() {
                let reason = match desired_by_ident.get(instance.ident()) {
                    None => {
                        delta.removed.push(instance.ident().clone());
                        "removed"
                    }
                    Some(info) if *info != instance.info() => {
                        delta.updated.push((*info).clone());
                        "info changed"
                    }
                    Some(_) if force_restart => "force restart",
                    Some(_) if instance.state() != InstanceState::Active => "not active",
                    Some(info) => {
                        let current = state.services.get(info.service_id()).map(|s| s.version()).unwrap_or(0);
                        if current == instance.service_version() {
                            continue;
                        }
                        "service changed"
                    }
                };

                debug!(instance = %instance, ident = %instance.ident(), reason, "instance scheduled for stop");
                stops.push(Arc::clone(instance));
            }

            for info in &desired {
                if !state.instances.contains(&info.ident) {
                    delta.added.push((*info).clone());
                }
            }

            (stops, refresh.failed)
        };

        self.dispatch(&stops, LaunchJob::Stop)?;

        let starts = {
            let mut state = self.lock();
            for instance in &stops {
                state.instances.remove(instance.ident());
            }

            let mut starts = Vec::new();
            for info in &desired {
                if state.instances.contains(&info.ident) {
                    continue;
                }

                let instance = Arc::new(Instance::new(
                    (*info).clone(),
                    Arc::clone(&self.ctx),
                    Arc::clone(&self.deps.runner),
                    Arc::clone(&self.deps.oci),
                    &self.config.runtime_dir,
                ));

                let service_id = info.service_id();
                match state.services.get(service_id) {
                    Some(service) => instance.assign_service(Some(service), None),
                    None => {
                        let err = failed_services
                            .get(service_id)
                            .cloned()
                            .unwrap_or_else(|| CoreError::NotFound(format!("service {service_id}")));
                        instance.assign_service(None, Some(err));
                    }
                }

                state.instances.insert(Arc::clone(&instance))?;
                starts.push(instance);
            }
            starts
        };

        self.dispatch(&starts, LaunchJob::Start)?;

        if let Some(e) = starts
            .iter()
            .filter_map(|i| i.error())
            .find(CoreError::is_structural)
        {
            return Err(e);
        }

        self.persist(delta);

        let state = self.lock();
        Ok(desired
            .iter()
            .filter_map(|info| state.instances.get(&info.ident))
            .map(|instance| instance.status())
            .collect())
    }

    /// Submits one job per instance and waits for the whole batch.
    fn dispatch(&self, instances: &[Arc<Instance>], job: fn(Arc<Instance>) -> LaunchJob) -> CoreResult<()> {
        if instances.is_empty() {
            return Ok(());
        }

        let mut result = Ok(());
        for instance in instances {
            if let Err(e) = self.pool.submit(job(Arc::clone(instance))) {
                error!(instance = %instance, error = %e, "failed to submit launch job");
                result = Err(CoreError::from(e));
                break;
            }
        }

        self.pool.wait_idle();
        result
    }

    fn persist(&self, delta: StorageDelta) {
        let storage = &self.deps.storage;

        for ident in &delta.removed {
            if let Err(e) = storage.remove_instance(ident) {
                error!(ident = %ident, error = %e, "failed to remove instance from storage");
            }
        }
        for info in &delta.updated {
            if let Err(e) = storage.update_instance(info) {
                error!(ident = %info.ident, error = %e, "failed to update instance in storage");
            }
        }
        for info in &delta.added {
            if let Err(e) = storage.add_instance(info) {
                error!(ident = %info.ident, error = %e, "failed to add instance to storage");
            }
        }
    }

    fn begin_pass(&self) -> CoreResult<PassGuard<'_>> {
        let mut state = self.lock();
        if state.in_progress {
            warn!("reconciliation already in progress");
            return Err(CoreError::WrongState("reconciliation already in progress".into()));
        }
        state.in_progress = true;
        Ok(PassGuard { launcher: self })
    }

    fn lock(&self) -> MutexGuard<'_, LauncherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RunStatusReceiver for Launcher {
    fn update_run_status(&self, statuses: &[RunnerStatus]) -> CoreResult<()> {
        let changed: Vec<RunStatus> = {
            let state = self.lock();
            statuses
                .iter()
                .filter_map(|status| match state.instances.get_by_id(&status.instance_id) {
                    Some(instance) => instance.apply_runner_status(status),
                    None => {
                        debug!(instance = %status.instance_id, "status for unknown instance ignored");
                        None
                    }
                })
                .collect()
        };

        if changed.is_empty() {
            return Ok(());
        }
        self.status.send(changed)
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "launcher shutdown failed");
        }
    }
}

/// Clears the in-progress flag when the pass ends, including on early return.
struct PassGuard<'a> {
    launcher: &'a Launcher,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.launcher.lock().in_progress = false;
    }
}

/// Keeps the first occurrence of every ident.
fn dedup(instances: &[InstanceInfo]) -> Vec<&InstanceInfo> {
    let mut seen = HashSet::with_capacity(instances.len());
    instances
        .iter()
        .filter(|info| {
            let fresh = seen.insert(&info.ident);
            if !fresh {
                warn!(ident = %info.ident, "duplicate instance ignored");
            }
            fresh
        })
        .collect()
}
