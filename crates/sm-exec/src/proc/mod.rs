//! Runner that launches every instance as a child process.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use serde::Deserialize;
use sm_core::{CoreError, CoreResult, Runner};
use sm_model::{ErrorKind, InstanceId, InstanceState, RunnerStatus, StatusError};
use tracing::{debug, trace, warn};

use crate::{
    error::{ExecError, ExecResult},
    utils::{RlimitConfig, attach_rlimits},
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Process launch settings shared by all instances.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcRunnerConfig {
    /// Invoked as `<program> <args..> <instance_id> <runtime_dir>`, with `runtime_dir` as cwd.
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Grace period between `SIGTERM` and `SIGKILL` on stop.
    pub stop_timeout_ms: u64,
    pub limits: RlimitConfig,
}

impl Default for ProcRunnerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            stop_timeout_ms: 5_000,
            limits: RlimitConfig::default(),
        }
    }
}

impl ProcRunnerConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

/// Runner backed by `std::process`.
///
/// Exits that happen outside `stop_instance` are picked up by [`poll_exited`](Self::poll_exited).
pub struct ProcRunner {
    name: &'static str,
    cfg: ProcRunnerConfig,
    children: Mutex<HashMap<InstanceId, Child>>,
}

impl ProcRunner {
    pub fn new(cfg: ProcRunnerConfig) -> Self {
        Self {
            name: "proc",
            cfg,
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Instances with a live child process.
    pub fn running(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self.children().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Reaps children that exited on their own and reports them.
    ///
    /// A zero exit is reported as `Stopped`, anything else as `Failed`.
    pub fn poll_exited(&self) -> Vec<RunnerStatus> {
        let mut children = self.children();
        let mut exited = Vec::new();

        for (id, child) in children.iter_mut() {
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => exited.push((id.clone(), exit_status(id, status))),
                Err(e) => exited.push((
                    id.clone(),
                    RunnerStatus::failed(id, StatusError::new(ErrorKind::Io, e.to_string())),
                )),
            }
        }

        exited
            .into_iter()
            .map(|(id, status)| {
                children.remove(&id);
                debug!(target: "sm.exec.proc", instance = %id, state = %status.state, "process exited");
                status
            })
            .collect()
    }

    fn spawn(&self, instance_id: &str, runtime_dir: &Path) -> ExecResult<Child> {
        if self.cfg.program.as_os_str().is_empty() {
            return Err(ExecError::MissingProgram);
        }

        trace!(target: "sm.exec.proc", program = %self.cfg.program.display(), args = ?self.cfg.args, "spawn");

        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&self.cfg.args)
            .arg(instance_id)
            .arg(runtime_dir)
            .current_dir(runtime_dir)
            .envs(&self.cfg.env)
            .stdin(Stdio::null());
        attach_rlimits(&mut cmd, &self.cfg.limits);

        cmd.spawn().map_err(|e| ExecError::Spawn(e.to_string()))
    }

    fn children(&self) -> MutexGuard<'_, HashMap<InstanceId, Child>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Runner for ProcRunner {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start_instance(&self, instance_id: &str, runtime_dir: &Path) -> RunnerStatus {
        let mut children = self.children();
        if children.contains_key(instance_id) {
            return RunnerStatus::failed(
                instance_id,
                StatusError::new(ErrorKind::WrongState, format!("{instance_id} is already running")),
            );
        }

        let mut child = match self.spawn(instance_id, runtime_dir) {
            Ok(child) => child,
            Err(e) => {
                warn!(target: "sm.exec.proc", instance = %instance_id, error = %e, "failed to spawn");
                return RunnerStatus::failed(instance_id, StatusError::new(ErrorKind::Runner, e.to_string()));
            }
        };

        match child.try_wait() {
            Ok(None) => {
                debug!(target: "sm.exec.proc", instance = %instance_id, pid = child.id(), "process started");
                children.insert(instance_id.to_string(), child);
                RunnerStatus::active(instance_id)
            }
            Ok(Some(status)) => exit_status(instance_id, status),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                RunnerStatus::failed(instance_id, StatusError::new(ErrorKind::Io, e.to_string()))
            }
        }
    }

    fn stop_instance(&self, instance_id: &str) -> CoreResult<()> {
        let Some(child) = self.children().remove(instance_id) else {
            debug!(target: "sm.exec.proc", instance = %instance_id, "no process to stop");
            return Ok(());
        };

        terminate(child, Duration::from_millis(self.cfg.stop_timeout_ms))
            .map_err(|e| CoreError::Runner(format!("stop {instance_id}: {e}")))?;

        debug!(target: "sm.exec.proc", instance = %instance_id, "process stopped");
        Ok(())
    }
}

impl Drop for ProcRunner {
    fn drop(&mut self) {
        let children = std::mem::take(&mut *self.children());
        for (id, mut child) in children {
            debug!(target: "sm.exec.proc", instance = %id, "killing process on drop");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn exit_status(instance_id: &str, status: ExitStatus) -> RunnerStatus {
    let err = match status.code() {
        Some(0) => None,
        Some(code) => Some(ExecError::NonZeroExit { code }),
        None => Some(ExecError::KilledBySignal),
    };

    match err {
        None => RunnerStatus {
            instance_id: instance_id.to_string(),
            state: InstanceState::Stopped,
            error: None,
        },
        Some(e) => RunnerStatus::failed(instance_id, StatusError::new(ErrorKind::Runner, e.to_string())),
    }
}

/// Asks the child to exit, escalating to `SIGKILL` after `grace`.
fn terminate(mut child: Child, grace: Duration) -> ExecResult<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        // SAFETY: plain syscall on a pid we own and have not reaped yet.
        unsafe {
            libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        warn!(target: "sm.exec.proc", pid = child.id(), "process ignored SIGTERM, killing");
    }

    #[cfg(not(unix))]
    let _ = grace;

    child.kill()?;
    child.wait()?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcRunner {
        ProcRunner::new(
            ProcRunnerConfig::new("/bin/sh")
                .with_args(["-c", script, "runner"])
                .with_stop_timeout(Duration::from_secs(2)),
        )
    }

    fn wait_exited(runner: &ProcRunner) -> Vec<RunnerStatus> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let exited = runner.poll_exited();
            if !exited.is_empty() || Instant::now() > deadline {
                return exited;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn start_then_stop() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = sh("sleep 30");

        let status = runner.start_instance("instance-0", tmp.path());
        assert_eq!(status.state, InstanceState::Active);
        assert_eq!(runner.running(), vec!["instance-0".to_string()]);

        runner.stop_instance("instance-0").unwrap();
        assert!(runner.running().is_empty());
    }

    #[test]
    fn receives_id_and_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = sh(r#"echo "$1" > "$2/started"; sleep 30"#);

        runner.start_instance("instance-7", tmp.path());
        let marker = tmp.path().join("started");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "instance-7");
        runner.stop_instance("instance-7").unwrap();
    }

    #[test]
    fn non_zero_exit_is_reported_as_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = sh("sleep 0.2; exit 3");

        runner.start_instance("instance-0", tmp.path());
        let exited = wait_exited(&runner);

        assert_eq!(exited.len(), 1);
        assert_eq!(exited[0].state, InstanceState::Failed);
        let err = exited[0].error.as_ref().unwrap();
        assert_eq!(err.kind, ErrorKind::Runner);
        assert!(err.message.contains('3'));
        assert!(runner.running().is_empty());
    }

    #[test]
    fn clean_exit_is_reported_as_stopped() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = sh("sleep 0.2");

        runner.start_instance("instance-0", tmp.path());
        let exited = wait_exited(&runner);

        assert_eq!(exited.len(), 1);
        assert_eq!(exited[0].state, InstanceState::Stopped);
        assert!(exited[0].error.is_none());
    }

    #[test]
    fn missing_program_fails_start() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ProcRunner::new(ProcRunnerConfig::new("/nonexistent/launcher"));

        let status = runner.start_instance("instance-0", tmp.path());
        assert_eq!(status.state, InstanceState::Failed);
        assert_eq!(status.error.map(|e| e.kind), Some(ErrorKind::Runner));
    }

    #[test]
    fn duplicate_start_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = sh("sleep 30");

        runner.start_instance("instance-0", tmp.path());
        let status = runner.start_instance("instance-0", tmp.path());

        assert_eq!(status.error.map(|e| e.kind), Some(ErrorKind::WrongState));
        runner.stop_instance("instance-0").unwrap();
    }

    #[test]
    fn stopping_unknown_instance_is_ok() {
        let runner = sh("true");
        runner.stop_instance("instance-42").unwrap();
    }
}
