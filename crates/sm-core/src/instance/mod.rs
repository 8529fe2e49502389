//! Per-workload lifecycle: runtime descriptor construction, start and stop through the runner.

mod context;
pub use context::{MAX_KERNEL_PARAMS, MAX_KERNEL_PATH, SpecContext};

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use sm_model::{
    InstanceId, InstanceIdent, InstanceInfo, InstanceState, RUNTIME_SPEC_FILE, RunStatus, RunnerStatus, StatusError,
};
use tracing::{debug, info, warn};

use crate::{
    api::{OciManager, Runner},
    error::{CoreError, CoreResult},
    service::Service,
};

struct Lifecycle {
    service: Weak<Service>,
    aos_version: u64,
    state: InstanceState,
    error: Option<CoreError>,
}

/// Runtime object for one desired instance.
///
/// The launcher owns instances through its table; workers receive shared handles for the
/// duration of a start or stop job. The lifecycle lock is never held across runner calls.
pub struct Instance {
    id: InstanceId,
    info: InstanceInfo,
    runtime_dir: PathBuf,
    ctx: Arc<SpecContext>,
    runner: Arc<dyn Runner>,
    oci: Arc<dyn OciManager>,
    lifecycle: Mutex<Lifecycle>,
}

impl Instance {
    pub fn new(
        info: InstanceInfo,
        ctx: Arc<SpecContext>,
        runner: Arc<dyn Runner>,
        oci: Arc<dyn OciManager>,
        runtime_root: &Path,
    ) -> Self {
        let id = ctx.next_instance_id();
        let runtime_dir = runtime_root.join(&id);

        info!(instance = %id, ident = %info.ident, "instance created");

        Self {
            id,
            info,
            runtime_dir,
            ctx,
            runner,
            oci,
            lifecycle: Mutex::new(Lifecycle {
                service: Weak::new(),
                aos_version: 0,
                state: InstanceState::Created,
                error: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn info(&self) -> &InstanceInfo {
        &self.info
    }

    pub fn ident(&self) -> &InstanceIdent {
        &self.info.ident
    }

    /// Private directory holding the runtime descriptor.
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Binds the resolved service, or records why it could not be resolved.
    pub fn assign_service(&self, service: Option<&Arc<Service>>, err: Option<CoreError>) {
        let mut lc = self.lifecycle();
        match service {
            Some(service) => {
                lc.service = Arc::downgrade(service);
                lc.aos_version = service.version();
                debug!(instance = %self.id, service = %service, "service assigned");
            }
            None => {
                lc.service = Weak::new();
                lc.aos_version = 0;
            }
        }
        lc.error = err;
    }

    /// Version of the assigned service, `0` when none.
    pub fn service_version(&self) -> u64 {
        self.lifecycle().aos_version
    }

    pub fn state(&self) -> InstanceState {
        self.lifecycle().state
    }

    pub fn error(&self) -> Option<CoreError> {
        self.lifecycle().error.clone()
    }

    pub fn status(&self) -> RunStatus {
        let lc = self.lifecycle();
        RunStatus {
            ident: self.info.ident.clone(),
            aos_version: lc.aos_version,
            state: lc.state,
            error: lc.error.as_ref().map(StatusError::from),
        }
    }

    /// Builds the runtime descriptor and asks the runner to start the instance.
    ///
    /// The resulting state and error are recorded whatever the outcome.
    pub fn start(&self) -> CoreResult<()> {
        debug!(instance = %self.id, "start instance");

        if let Err(e) = self.create_runtime_spec() {
            self.record(InstanceState::Failed, Some(e.clone()));
            return Err(e);
        }
        self.record(InstanceState::Starting, None);

        let status = self.runner.start_instance(&self.id, &self.runtime_dir);
        let err = status
            .error
            .map(|e| CoreError::from(e).context(format!("{} start", self.runner.name())));
        let state = if err.is_some() {
            InstanceState::Failed
        } else {
            status.state
        };

        self.record(state, err.clone());
        match err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stops the instance and removes its runtime directory.
    ///
    /// Both steps always run; the first error is returned.
    pub fn stop(&self) -> CoreResult<()> {
        debug!(instance = %self.id, "stop instance");
        self.record(InstanceState::Stopping, None);

        let mut first = self.runner.stop_instance(&self.id).err();

        if let Err(e) = remove_dir(&self.runtime_dir) {
            let e = CoreError::from(e).context(self.runtime_dir.display());
            first.get_or_insert(e);
        }

        match first {
            None => {
                self.record(InstanceState::Stopped, None);
                Ok(())
            }
            Some(e) => {
                self.record(InstanceState::Failed, Some(e.clone()));
                Err(e)
            }
        }
    }

    /// Applies a state change reported by the runner. Returns the new status if anything changed.
    pub fn apply_runner_status(&self, status: &RunnerStatus) -> Option<RunStatus> {
        let err = status.error.clone().map(CoreError::from);
        {
            let mut lc = self.lifecycle();
            if lc.state == status.state && lc.error == err {
                return None;
            }
            lc.state = status.state;
            lc.error = err;
        }

        if status.state == InstanceState::Failed {
            warn!(instance = %self.id, error = ?status.error, "instance failed");
        } else {
            debug!(instance = %self.id, state = %status.state, "instance state changed");
        }
        Some(self.status())
    }

    fn create_runtime_spec(&self) -> CoreResult<()> {
        recreate_dir(&self.runtime_dir).map_err(|e| CoreError::from(e).context(self.runtime_dir.display()))?;

        let service = {
            let lc = self.lifecycle();
            match lc.service.upgrade() {
                Some(service) => service,
                None => {
                    let cause = lc.error.as_ref().map(ToString::to_string).unwrap_or_else(|| "not assigned".into());
                    return Err(CoreError::NotFound(format!(
                        "service {} for {}: {cause}",
                        self.info.service_id(),
                        self.id
                    )));
                }
            }
        };

        let cmd = &service.image_spec().config.cmd;
        if cmd.is_empty() {
            return Err(CoreError::InvalidArgument(format!("service {service} declares no command")));
        }

        let spec_path = self.runtime_dir.join(RUNTIME_SPEC_FILE);
        self.ctx.with_runtime_spec(service.service_fs_path(), cmd, |spec| {
            debug!(instance = %self.id, kernel = ?spec.kernel_path(), "runtime spec built");
            self.oci.save_runtime_spec(&spec_path, spec)
        })?;

        self.record(InstanceState::SpecBuilt, None);
        Ok(())
    }

    fn record(&self, state: InstanceState, error: Option<CoreError>) {
        let mut lc = self.lifecycle();
        lc.state = state;
        lc.error = error;
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("ident", &self.info.ident)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

fn recreate_dir(path: &Path) -> io::Result<()> {
    remove_dir(path)?;
    fs::create_dir_all(path)
}

fn remove_dir(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use sm_model::{ErrorKind, ImageParts, ImageSpec, InstanceIdent, ServiceData, VersionInfo};

    use super::*;
    use crate::testing::{MockOciManager, MockRunner};

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
        ctx: Arc<SpecContext>,
        runner: Arc<MockRunner>,
        oci: Arc<MockOciManager>,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            Self {
                root: tmp.path().to_path_buf(),
                _tmp: tmp,
                ctx: Arc::new(SpecContext::new()),
                runner: Arc::new(MockRunner::new()),
                oci: Arc::new(MockOciManager::new()),
            }
        }

        fn instance(&self, service: &str) -> Instance {
            let info = InstanceInfo::new(InstanceIdent::new(service, "subject", 0));
            Instance::new(
                info,
                Arc::clone(&self.ctx),
                self.runner.clone(),
                self.oci.clone(),
                &self.root,
            )
        }
    }

    fn service(cmd: &[&str]) -> Arc<Service> {
        let data = ServiceData {
            service_id: "svc".into(),
            provider_id: String::new(),
            version: VersionInfo::new(3),
            image_path: PathBuf::from("/srv/svc"),
        };
        let parts = ImageParts {
            image_config_path: PathBuf::from("/srv/svc/image.json"),
            service_config_path: PathBuf::from("/srv/svc/service.json"),
            service_fs_path: PathBuf::from("/srv/svc/rootfs"),
        };
        Arc::new(Service::new(data, parts, ImageSpec::with_cmd(cmd.iter().copied())))
    }

    #[test]
    fn start_builds_descriptor_and_runs() {
        let fx = Fixture::new();
        let svc = service(&["unikernel.bin"]);
        let inst = fx.instance("svc");
        inst.assign_service(Some(&svc), None);

        inst.start().unwrap();

        assert_eq!(inst.state(), InstanceState::Active);
        assert!(inst.runtime_dir().is_dir());
        assert_eq!(inst.status().aos_version, 3);

        let saved = fx.oci.saved_spec(&inst.runtime_dir().join(RUNTIME_SPEC_FILE)).unwrap();
        assert_eq!(saved.kernel_path(), Some(&PathBuf::from("/srv/svc/rootfs/unikernel.bin")));
        assert_eq!(fx.runner.starts(), vec![inst.id().to_string()]);
    }

    #[test]
    fn start_without_service_is_not_found() {
        let fx = Fixture::new();
        let inst = fx.instance("svc");
        inst.assign_service(None, Some(CoreError::ServiceManager("unreachable".into())));

        let err = inst.start().unwrap_err();

        assert!(matches!(err, CoreError::NotFound(_)));
        let status = inst.status();
        assert_eq!(status.state, InstanceState::Failed);
        assert_eq!(status.error.map(|e| e.kind), Some(ErrorKind::NotFound));
        assert!(fx.runner.starts().is_empty());
    }

    #[test]
    fn start_without_command_is_invalid() {
        let fx = Fixture::new();
        let svc = service(&[]);
        let inst = fx.instance("svc");
        inst.assign_service(Some(&svc), None);

        assert!(matches!(inst.start(), Err(CoreError::InvalidArgument(_))));
        assert_eq!(inst.state(), InstanceState::Failed);
    }

    #[test]
    fn start_records_runner_failure() {
        let fx = Fixture::new();
        fx.runner.fail_starts(StatusError::new(ErrorKind::Runner, "exit code: 1"));
        let svc = service(&["k"]);
        let inst = fx.instance("svc");
        inst.assign_service(Some(&svc), None);

        let err = inst.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runner);
        assert_eq!(inst.state(), InstanceState::Failed);
    }

    #[test]
    fn start_clears_previous_runtime_dir() {
        let fx = Fixture::new();
        let svc = service(&["k"]);
        let inst = fx.instance("svc");
        inst.assign_service(Some(&svc), None);

        fs::create_dir_all(inst.runtime_dir()).unwrap();
        fs::write(inst.runtime_dir().join("stale"), b"x").unwrap();

        inst.start().unwrap();
        assert!(!inst.runtime_dir().join("stale").exists());
    }

    #[test]
    fn stop_removes_dir_even_if_runner_fails() {
        let fx = Fixture::new();
        let svc = service(&["k"]);
        let inst = fx.instance("svc");
        inst.assign_service(Some(&svc), None);
        inst.start().unwrap();

        fx.runner.fail_stops(CoreError::Runner("no such process".into()));
        let err = inst.stop().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Runner);
        assert!(!inst.runtime_dir().exists());
        assert_eq!(inst.state(), InstanceState::Failed);
    }

    #[test]
    fn stop_without_dir_succeeds() {
        let fx = Fixture::new();
        let inst = fx.instance("svc");

        inst.stop().unwrap();
        assert_eq!(inst.state(), InstanceState::Stopped);
    }

    #[test]
    fn runner_status_changes_are_reported_once() {
        let fx = Fixture::new();
        let inst = fx.instance("svc");

        let failed = RunnerStatus::failed(inst.id(), StatusError::new(ErrorKind::Runner, "crashed"));
        let status = inst.apply_runner_status(&failed).unwrap();
        assert!(status.is_failed());
        assert!(inst.apply_runner_status(&failed).is_none());
    }

    #[test]
    fn instances_get_distinct_ids() {
        let fx = Fixture::new();
        let a = fx.instance("svc");
        let b = fx.instance("svc");
        assert_ne!(a.id(), b.id());
        assert_ne!(a.runtime_dir(), b.runtime_dir());
    }
}
