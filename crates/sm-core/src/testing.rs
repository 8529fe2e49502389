//! In-memory doubles for the collaborator traits.
//!
//! Every double records the calls it receives and can be told to fail, so launcher behaviour can
//! be checked without processes or files.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    time::Duration,
};

use sm_model::{
    ImageParts, ImageSpec, InstanceId, InstanceIdent, InstanceInfo, RunStatus, RunnerStatus, RuntimeSpec, ServiceData,
    ServiceInfo, StatusError, VersionInfo,
};

use crate::{
    api::{OciManager, Runner, ServiceManager, StatusReceiver, Storage},
    error::{CoreError, CoreResult},
    pool::monitor::{Monitor, Signal},
};

/// Call recorded by [`MockRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    Start(InstanceId),
    Stop(InstanceId),
}

#[derive(Default)]
struct RunnerState {
    events: Vec<RunnerEvent>,
    running: BTreeSet<InstanceId>,
    start_error: Option<StatusError>,
    stop_error: Option<CoreError>,
    blocked: bool,
    waiting: usize,
}

/// Runner double. Starts succeed with `Active` unless told otherwise.
pub struct MockRunner {
    state: Monitor<RunnerState>,
    gate: Signal,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            state: Monitor::new(RunnerState::default()),
            gate: Signal::new(),
        }
    }

    pub fn events(&self) -> Vec<RunnerEvent> {
        self.state.lock().events.clone()
    }

    /// IDs passed to `start_instance`, in call order.
    pub fn starts(&self) -> Vec<InstanceId> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                RunnerEvent::Start(id) => Some(id.clone()),
                RunnerEvent::Stop(_) => None,
            })
            .collect()
    }

    /// IDs passed to `stop_instance`, in call order.
    pub fn stops(&self) -> Vec<InstanceId> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                RunnerEvent::Stop(id) => Some(id.clone()),
                RunnerEvent::Start(_) => None,
            })
            .collect()
    }

    /// Instances started and not stopped since.
    pub fn running(&self) -> Vec<InstanceId> {
        self.state.lock().running.iter().cloned().collect()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    pub fn fail_starts(&self, err: StatusError) {
        self.state.lock().start_error = Some(err);
    }

    pub fn fail_stops(&self, err: CoreError) {
        self.state.lock().stop_error = Some(err);
    }

    pub fn succeed(&self) {
        let mut state = self.state.lock();
        state.start_error = None;
        state.stop_error = None;
    }

    /// Makes `start_instance` block until [`release`](Self::release).
    pub fn block_starts(&self) {
        self.state.lock().blocked = true;
    }

    pub fn release(&self) {
        self.state.lock().blocked = false;
        self.gate.notify_all();
    }

    /// Waits until at least one start is parked on the gate.
    pub fn wait_blocked(&self, timeout: Duration) -> bool {
        let state = self.state.lock();
        let (_state, ready) = self.gate.wait_timeout_until(state, timeout, |s| s.waiting > 0);
        ready
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for MockRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn start_instance(&self, instance_id: &str, _runtime_dir: &Path) -> RunnerStatus {
        let mut state = self.state.lock();
        state.waiting += 1;
        self.gate.notify_all();
        let mut state = self.gate.wait_until(state, |s| !s.blocked);
        state.waiting -= 1;

        state.events.push(RunnerEvent::Start(instance_id.to_string()));
        match state.start_error.clone() {
            Some(err) => RunnerStatus::failed(instance_id, err),
            None => {
                state.running.insert(instance_id.to_string());
                RunnerStatus::active(instance_id)
            }
        }
    }

    fn stop_instance(&self, instance_id: &str) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.events.push(RunnerEvent::Stop(instance_id.to_string()));
        state.running.remove(instance_id);
        match state.stop_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct OciState {
    images: HashMap<PathBuf, ImageSpec>,
    saved: HashMap<PathBuf, RuntimeSpec>,
    save_error: Option<CoreError>,
}

/// OCI manager double keeping descriptors in memory.
pub struct MockOciManager {
    state: Monitor<OciState>,
}

impl MockOciManager {
    pub fn new() -> Self {
        Self {
            state: Monitor::new(OciState::default()),
        }
    }

    pub fn add_image_spec(&self, path: impl Into<PathBuf>, spec: ImageSpec) {
        self.state.lock().images.insert(path.into(), spec);
    }

    pub fn saved_spec(&self, path: &Path) -> Option<RuntimeSpec> {
        self.state.lock().saved.get(path).cloned()
    }

    pub fn saved_count(&self) -> usize {
        self.state.lock().saved.len()
    }

    pub fn fail_saves(&self, err: CoreError) {
        self.state.lock().save_error = Some(err);
    }
}

impl Default for MockOciManager {
    fn default() -> Self {
        Self::new()
    }
}

impl OciManager for MockOciManager {
    fn load_image_spec(&self, path: &Path) -> CoreResult<ImageSpec> {
        self.state
            .lock()
            .images
            .get(path)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("image spec {}", path.display())))
    }

    fn save_runtime_spec(&self, path: &Path, spec: &RuntimeSpec) -> CoreResult<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.save_error.clone() {
            return Err(err);
        }
        state.saved.insert(path.to_path_buf(), spec.clone());
        Ok(())
    }
}

#[derive(Default)]
struct ManagerState {
    services: HashMap<String, ServiceData>,
    installed: Vec<ServiceInfo>,
    install_calls: usize,
    install_error: Option<CoreError>,
    failing: HashMap<String, CoreError>,
}

/// Service manager double. Only services registered with [`add_service`](Self::add_service)
/// resolve; installation just records the request.
pub struct MockServiceManager {
    state: Monitor<ManagerState>,
}

impl MockServiceManager {
    pub fn new() -> Self {
        Self {
            state: Monitor::new(ManagerState::default()),
        }
    }

    /// Registers (or replaces) an installed service and its image spec.
    pub fn add_service(&self, oci: &MockOciManager, service_id: &str, version: u64, cmd: &[&str]) -> ServiceData {
        let data = ServiceData {
            service_id: service_id.to_string(),
            provider_id: String::new(),
            version: VersionInfo::new(version),
            image_path: PathBuf::from("/srv/services").join(service_id).join(version.to_string()),
        };
        let parts = image_parts(&data);
        oci.add_image_spec(parts.image_config_path, ImageSpec::with_cmd(cmd.iter().copied()));

        self.state
            .lock()
            .services
            .insert(service_id.to_string(), data.clone());
        data
    }

    pub fn remove_service(&self, service_id: &str) {
        self.state.lock().services.remove(service_id);
    }

    pub fn install_calls(&self) -> usize {
        self.state.lock().install_calls
    }

    /// Every service passed to `install_services` so far.
    pub fn installed(&self) -> Vec<ServiceInfo> {
        self.state.lock().installed.clone()
    }

    /// Makes every install call fail with `err`.
    pub fn fail_installs(&self, err: Option<CoreError>) {
        self.state.lock().install_error = err;
    }

    /// Makes installs that include `service_id` fail with `err`.
    pub fn fail_install_of(&self, service_id: &str, err: Option<CoreError>) {
        let mut state = self.state.lock();
        match err {
            Some(err) => state.failing.insert(service_id.to_string(), err),
            None => state.failing.remove(service_id),
        };
    }
}

impl Default for MockServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

fn image_parts(data: &ServiceData) -> ImageParts {
    ImageParts {
        image_config_path: data.image_path.join("image.json"),
        service_config_path: data.image_path.join("service.json"),
        service_fs_path: data.image_path.join("rootfs"),
    }
}

impl ServiceManager for MockServiceManager {
    fn install_services(&self, services: &[ServiceInfo]) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.install_calls += 1;
        if let Some(err) = state.install_error.clone() {
            return Err(err);
        }
        if let Some(err) = services.iter().find_map(|s| state.failing.get(&s.service_id)) {
            return Err(err.clone());
        }
        state.installed.extend_from_slice(services);
        Ok(())
    }

    fn get_service(&self, service_id: &str) -> CoreResult<ServiceData> {
        self.state
            .lock()
            .services
            .get(service_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("service {service_id}")))
    }

    fn get_image_parts(&self, service: &ServiceData) -> CoreResult<ImageParts> {
        Ok(image_parts(service))
    }

    fn get_all_services(&self) -> CoreResult<Vec<ServiceData>> {
        let mut all: Vec<ServiceData> = self.state.lock().services.values().cloned().collect();
        all.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        Ok(all)
    }
}

#[derive(Default)]
struct StorageState {
    instances: BTreeMap<InstanceIdent, InstanceInfo>,
    adds: usize,
    updates: usize,
    removes: usize,
    error: Option<CoreError>,
}

/// Storage double. `add_instance` replaces an existing record.
pub struct MockStorage {
    state: Monitor<StorageState>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            state: Monitor::new(StorageState::default()),
        }
    }

    pub fn with_instances(instances: impl IntoIterator<Item = InstanceInfo>) -> Self {
        let storage = Self::new();
        {
            let mut state = storage.state.lock();
            for info in instances {
                state.instances.insert(info.ident.clone(), info);
            }
        }
        storage
    }

    pub fn instances(&self) -> Vec<InstanceInfo> {
        self.state.lock().instances.values().cloned().collect()
    }

    pub fn adds(&self) -> usize {
        self.state.lock().adds
    }

    pub fn updates(&self) -> usize {
        self.state.lock().updates
    }

    pub fn removes(&self) -> usize {
        self.state.lock().removes
    }

    pub fn fail_with(&self, err: Option<CoreError>) {
        self.state.lock().error = err;
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MockStorage {
    fn add_instance(&self, instance: &InstanceInfo) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.adds += 1;
        if let Some(err) = state.error.clone() {
            return Err(err);
        }
        state.instances.insert(instance.ident.clone(), instance.clone());
        Ok(())
    }

    fn update_instance(&self, instance: &InstanceInfo) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.updates += 1;
        if let Some(err) = state.error.clone() {
            return Err(err);
        }
        match state.instances.get_mut(&instance.ident) {
            Some(stored) => {
                *stored = instance.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("instance {}", instance.ident))),
        }
    }

    fn remove_instance(&self, ident: &InstanceIdent) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.removes += 1;
        if let Some(err) = state.error.clone() {
            return Err(err);
        }
        state
            .instances
            .remove(ident)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("instance {ident}")))
    }

    fn get_all_instances(&self) -> CoreResult<Vec<InstanceInfo>> {
        let state = self.state.lock();
        if let Some(err) = state.error.clone() {
            return Err(err);
        }
        Ok(state.instances.values().cloned().collect())
    }
}

#[derive(Default)]
struct ReceiverState {
    run: Vec<Vec<RunStatus>>,
    updates: Vec<Vec<RunStatus>>,
}

/// Status receiver double collecting every delivered batch.
pub struct MockStatusReceiver {
    state: Monitor<ReceiverState>,
    delivered: Signal,
}

impl MockStatusReceiver {
    pub fn new() -> Self {
        Self {
            state: Monitor::new(ReceiverState::default()),
            delivered: Signal::new(),
        }
    }

    /// Batches received through `instances_run_status`.
    pub fn run_statuses(&self) -> Vec<Vec<RunStatus>> {
        self.state.lock().run.clone()
    }

    pub fn last_run_status(&self) -> Option<Vec<RunStatus>> {
        self.state.lock().run.last().cloned()
    }

    /// Waits for `count` update batches and returns everything received so far.
    pub fn wait_updates(&self, count: usize, timeout: Duration) -> Vec<Vec<RunStatus>> {
        let state = self.state.lock();
        let (state, _) = self
            .delivered
            .wait_timeout_until(state, timeout, |s| s.updates.len() >= count);
        state.updates.clone()
    }
}

impl Default for MockStatusReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReceiver for MockStatusReceiver {
    fn instances_run_status(&self, statuses: &[RunStatus]) -> CoreResult<()> {
        self.state.lock().run.push(statuses.to_vec());
        self.delivered.notify_all();
        Ok(())
    }

    fn instances_update_status(&self, statuses: &[RunStatus]) -> CoreResult<()> {
        self.state.lock().updates.push(statuses.to_vec());
        self.delivered.notify_all();
        Ok(())
    }
}
