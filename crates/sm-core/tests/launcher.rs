use std::{sync::Arc, thread, time::Duration};

use sm_core::{
    Collaborators, CoreError, Launcher, LauncherConfig, RunStatusReceiver,
    testing::{MockOciManager, MockRunner, MockServiceManager, MockStatusReceiver, MockStorage, RunnerEvent},
};
use sm_model::{
    ErrorKind, InstanceIdent, InstanceInfo, InstanceState, RUNTIME_SPEC_FILE, RunStatus, RunnerStatus, ServiceInfo,
    StatusError,
};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    tmp: tempfile::TempDir,
    runner: Arc<MockRunner>,
    oci: Arc<MockOciManager>,
    services: Arc<MockServiceManager>,
    storage: Arc<MockStorage>,
    receiver: Arc<MockStatusReceiver>,
    launcher: Arc<Launcher>,
}

impl Harness {
    fn new() -> Self {
        Self::build(MockStorage::new(), |c| c)
    }

    fn build(storage: MockStorage, tune: impl FnOnce(LauncherConfig) -> LauncherConfig) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new());
        let oci = Arc::new(MockOciManager::new());
        let services = Arc::new(MockServiceManager::new());
        let storage = Arc::new(storage);
        let receiver = Arc::new(MockStatusReceiver::new());

        let config = tune(
            LauncherConfig::new()
                .with_workers(2)
                .with_runtime_dir(tmp.path()),
        );
        let launcher = Launcher::new(
            config,
            Collaborators {
                service_manager: services.clone(),
                runner: runner.clone(),
                oci: oci.clone(),
                storage: storage.clone(),
                status_receiver: receiver.clone(),
            },
        )
        .unwrap();

        Self {
            tmp,
            runner,
            oci,
            services,
            storage,
            receiver,
            launcher: Arc::new(launcher),
        }
    }

    fn service(&self, id: &str, version: u64) -> ServiceInfo {
        self.services.add_service(&self.oci, id, version, &["unikernel.bin"]);
        ServiceInfo::new(id, version)
    }

    fn run(&self, services: &[ServiceInfo], instances: &[InstanceInfo], force: bool) -> Result<(), CoreError> {
        self.launcher.run_instances(services, &[], instances, force)
    }

    fn last_status(&self) -> Vec<RunStatus> {
        self.receiver.last_run_status().unwrap()
    }
}

fn instance(service: &str, n: u64) -> InstanceInfo {
    InstanceInfo::new(InstanceIdent::new(service, "subject", n))
}

fn all_active(statuses: &[RunStatus]) -> bool {
    statuses.iter().all(|s| s.state == InstanceState::Active && s.error.is_none())
}

#[test]
fn starts_desired_instances() {
    let h = Harness::new();
    let svc = h.service("svc", 1);

    h.run(&[svc], &[instance("svc", 0), instance("svc", 1)], false)
        .unwrap();

    let statuses = h.last_status();
    assert_eq!(statuses.len(), 2);
    assert!(all_active(&statuses));
    assert_eq!(statuses[0].aos_version, 1);
    assert_eq!(h.runner.starts().len(), 2);
    assert_eq!(h.runner.running().len(), 2);
    assert_eq!(h.storage.instances().len(), 2);
}

#[test]
fn writes_runtime_descriptor_per_instance() {
    let h = Harness::new();
    let svc = h.service("svc", 1);

    h.run(&[svc], &[instance("svc", 0)], false).unwrap();

    let id = &h.runner.starts()[0];
    assert!(id.starts_with("instance-"));

    let dir = h.tmp.path().join(id);
    assert!(dir.is_dir());
    let spec = h.oci.saved_spec(&dir.join(RUNTIME_SPEC_FILE)).unwrap();
    let kernel = spec.kernel_path().unwrap();
    assert!(kernel.ends_with("rootfs/unikernel.bin"));
}

#[test]
fn identical_inputs_issue_no_work() {
    let h = Harness::new();
    let svc = h.service("svc", 1);
    let instances = [instance("svc", 0), instance("svc", 1)];

    h.run(&[svc.clone()], &instances, false).unwrap();
    h.runner.clear_events();
    let installs = h.services.install_calls();

    h.run(&[svc], &instances, false).unwrap();

    assert!(h.runner.events().is_empty());
    assert_eq!(h.services.install_calls(), installs);
    assert_eq!(h.receiver.run_statuses().len(), 2);
    assert!(all_active(&h.last_status()));
}

#[test]
fn force_restart_stops_everything_before_starting() {
    let h = Harness::new();
    let svc = h.service("svc", 1);
    let instances = [instance("svc", 0), instance("svc", 1), instance("svc", 2)];

    h.run(&[svc.clone()], &instances, false).unwrap();
    let old_ids = h.runner.starts();
    h.runner.clear_events();

    h.run(&[svc], &instances, true).unwrap();

    let events = h.runner.events();
    assert_eq!(events.len(), 6);
    assert!(events[..3].iter().all(|e| matches!(e, RunnerEvent::Stop(_))));
    assert!(events[3..].iter().all(|e| matches!(e, RunnerEvent::Start(_))));

    let mut stopped = h.runner.stops();
    stopped.sort();
    let mut expected = old_ids.clone();
    expected.sort();
    assert_eq!(stopped, expected);

    for id in h.runner.starts() {
        assert!(!old_ids.contains(&id));
    }
    assert!(all_active(&h.last_status()));
}

#[test]
fn unresolved_service_fails_only_its_instances() {
    let h = Harness::new();
    let good = h.service("good", 1);
    let bad = ServiceInfo::new("bad", 1);

    h.run(&[good, bad], &[instance("good", 0), instance("bad", 0), instance("good", 1)], false)
        .unwrap();

    let statuses = h.last_status();
    assert_eq!(statuses.len(), 3);
    for status in &statuses {
        if status.ident.service_id == "bad" {
            assert_eq!(status.state, InstanceState::Failed);
            assert_eq!(status.error.as_ref().map(|e| e.kind), Some(ErrorKind::NotFound));
        } else {
            assert_eq!(status.state, InstanceState::Active);
        }
    }
    assert_eq!(h.runner.starts().len(), 2);
}

#[test]
fn failed_install_does_not_affect_sibling_services() {
    let h = Harness::new();
    let good = h.service("good", 1);
    let bad = h.service("bad", 1);
    h.services
        .fail_install_of("bad", Some(CoreError::ServiceManager("unsupported service url".into())));
    let instances = [instance("good", 0), instance("bad", 0)];

    for _ in 0..2 {
        h.run(&[good.clone(), bad.clone()], &instances, false).unwrap();

        let statuses = h.last_status();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].ident.service_id, "good");
        assert_eq!(statuses[0].state, InstanceState::Active);
        assert!(statuses[0].error.is_none());
        assert_eq!(statuses[1].state, InstanceState::Failed);
        assert_eq!(statuses[1].error.as_ref().map(|e| e.kind), Some(ErrorKind::NotFound));
    }
    assert_eq!(h.runner.starts().len(), 1);

    h.services.fail_install_of("bad", None);
    h.run(&[good, bad], &instances, false).unwrap();
    assert!(all_active(&h.last_status()));
    assert_eq!(h.runner.starts().len(), 2);
}

#[test]
fn removed_instance_is_stopped_and_forgotten() {
    let h = Harness::new();
    let svc = h.service("svc", 1);

    h.run(&[svc.clone()], &[instance("svc", 0), instance("svc", 1)], false)
        .unwrap();
    h.runner.clear_events();

    h.run(&[svc], &[instance("svc", 0)], false).unwrap();

    assert_eq!(h.runner.stops().len(), 1);
    assert!(h.runner.starts().is_empty());
    assert_eq!(h.last_status().len(), 1);
    assert_eq!(h.storage.removes(), 1);
    assert_eq!(h.storage.instances(), vec![instance("svc", 0)]);
    assert_eq!(h.launcher.statuses().len(), 1);
}

#[test]
fn empty_desired_set_stops_all() {
    let h = Harness::new();
    let svc = h.service("svc", 1);

    h.run(&[svc], &[instance("svc", 0), instance("svc", 1)], false)
        .unwrap();
    h.run(&[], &[], false).unwrap();

    assert!(h.runner.running().is_empty());
    assert!(h.launcher.statuses().is_empty());
    assert!(h.last_status().is_empty());
    assert!(h.storage.instances().is_empty());
}

#[test]
fn service_update_restarts_its_instances() {
    let h = Harness::new();
    let v1 = h.service("svc", 1);
    let other = h.service("other", 1);
    let instances = [instance("svc", 0), instance("other", 0)];

    h.run(&[v1, other.clone()], &instances, false).unwrap();
    h.runner.clear_events();

    let v2 = h.service("svc", 2);
    h.run(&[v2, other], &instances, false).unwrap();

    assert_eq!(h.runner.stops().len(), 1);
    assert_eq!(h.runner.starts().len(), 1);

    let statuses = h.last_status();
    let svc = statuses.iter().find(|s| s.ident.service_id == "svc").unwrap();
    assert_eq!(svc.aos_version, 2);
    assert_eq!(svc.state, InstanceState::Active);
}

#[test]
fn failed_instance_is_retried_on_next_pass() {
    let h = Harness::new();
    let svc = h.service("svc", 1);
    let instances = [instance("svc", 0)];

    h.runner
        .fail_starts(StatusError::new(ErrorKind::Runner, "exit code: 1"));
    h.run(&[svc.clone()], &instances, false).unwrap();
    assert_eq!(h.last_status()[0].state, InstanceState::Failed);
    assert_eq!(h.last_status()[0].error.as_ref().map(|e| e.kind), Some(ErrorKind::Runner));

    h.runner.succeed();
    h.runner.clear_events();
    h.run(&[svc], &instances, false).unwrap();

    assert_eq!(h.runner.starts().len(), 1);
    assert!(all_active(&h.last_status()));
}

#[test]
fn changed_info_restarts_and_updates_storage() {
    let h = Harness::new();
    let svc = h.service("svc", 1);

    h.run(&[svc.clone()], &[instance("svc", 0)], false).unwrap();
    h.runner.clear_events();

    let changed = instance("svc", 0).with_priority(10);
    h.run(&[svc], &[changed.clone()], false).unwrap();

    assert_eq!(h.runner.stops().len(), 1);
    assert_eq!(h.runner.starts().len(), 1);
    assert_eq!(h.storage.updates(), 1);
    assert_eq!(h.storage.instances(), vec![changed]);
}

#[test]
fn overlapping_pass_is_wrong_state() {
    let h = Harness::new();
    let svc = h.service("svc", 1);

    h.runner.block_starts();
    let launcher = Arc::clone(&h.launcher);
    let services = vec![svc.clone()];
    let first = thread::spawn(move || launcher.run_instances(&services, &[], &[instance("svc", 0)], false));

    assert!(h.runner.wait_blocked(WAIT));
    let err = h.run(&[svc], &[instance("svc", 1)], false).unwrap_err();
    assert!(matches!(err, CoreError::WrongState(_)));

    h.runner.release();
    first.join().unwrap().unwrap();
    assert_eq!(h.launcher.statuses().len(), 1);
}

#[test]
fn too_many_instances_is_capacity_error() {
    let h = Harness::build(MockStorage::new(), |c| c.with_max_instances(2));
    let svc = h.service("svc", 1);

    let err = h
        .run(&[svc], &[instance("svc", 0), instance("svc", 1), instance("svc", 2)], false)
        .unwrap_err();

    assert!(err.is_structural());
    assert!(h.runner.events().is_empty());
    assert!(h.receiver.run_statuses().is_empty());
}

#[test]
fn too_many_layers_is_capacity_error() {
    let h = Harness::build(MockStorage::new(), |c| c.with_max_layers(1));
    let svc = h.service("svc", 1);
    let layers = [
        sm_model::LayerInfo::new("l1", "sha256:1"),
        sm_model::LayerInfo::new("l2", "sha256:2"),
    ];

    let err = h
        .launcher
        .run_instances(&[svc], &layers, &[instance("svc", 0)], false)
        .unwrap_err();
    assert!(err.is_structural());
}

#[test]
fn pass_after_capacity_error_is_accepted() {
    let h = Harness::build(MockStorage::new(), |c| c.with_max_instances(1));
    let svc = h.service("svc", 1);

    assert!(
        h.run(&[svc.clone()], &[instance("svc", 0), instance("svc", 1)], false)
            .is_err()
    );
    h.run(&[svc], &[instance("svc", 0)], false).unwrap();
    assert!(all_active(&h.last_status()));
}

#[test]
fn run_last_instances_restores_storage() {
    let stored = [instance("svc", 0), instance("svc", 1)];
    let h = Harness::build(MockStorage::with_instances(stored.clone()), |c| c);
    h.service("svc", 4);
    h.service("unused", 1);

    h.launcher.run_last_instances().unwrap();

    let statuses = h.last_status();
    assert_eq!(statuses.len(), 2);
    assert!(all_active(&statuses));
    assert!(statuses.iter().all(|s| s.aos_version == 4));
    assert_eq!(h.storage.instances(), stored.to_vec());
    assert!(h.services.installed().iter().all(|s| s.service_id == "svc"));
}

#[test]
fn storage_failures_do_not_abort() {
    let h = Harness::new();
    let svc = h.service("svc", 1);
    h.storage
        .fail_with(Some(CoreError::Storage("disk full".into())));

    h.run(&[svc], &[instance("svc", 0)], false).unwrap();

    assert_eq!(h.storage.adds(), 1);
    assert!(all_active(&h.last_status()));
}

#[test]
fn runner_updates_are_delivered_and_trigger_restart() {
    let h = Harness::new();
    let svc = h.service("svc", 1);
    let instances = [instance("svc", 0)];

    h.run(&[svc.clone()], &instances, false).unwrap();
    let id = h.runner.starts()[0].clone();

    h.launcher
        .update_run_status(&[RunnerStatus::failed(&id, StatusError::new(ErrorKind::Runner, "crashed"))])
        .unwrap();

    let updates = h.receiver.wait_updates(1, WAIT);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0][0].ident, instances[0].ident);
    assert_eq!(updates[0][0].state, InstanceState::Failed);

    h.runner.clear_events();
    h.run(&[svc], &instances, false).unwrap();
    assert_eq!(h.runner.stops(), vec![id]);
    assert_eq!(h.runner.starts().len(), 1);
}

#[test]
fn unknown_runner_status_is_ignored() {
    let h = Harness::new();
    h.launcher
        .update_run_status(&[RunnerStatus::active("instance-99")])
        .unwrap();
    assert!(h.launcher.statuses().is_empty());
}

#[test]
fn no_work_after_shutdown() {
    let h = Harness::new();
    let svc = h.service("svc", 1);

    h.launcher.shutdown().unwrap();
    let err = h.run(&[svc], &[instance("svc", 0)], false).unwrap_err();

    assert!(matches!(err, CoreError::WrongState(_)));
    assert!(h.runner.events().is_empty());
}
