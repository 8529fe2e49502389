use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use sm_core::LauncherConfig;
use sm_exec::ProcRunnerConfig;
use sm_model::{InstanceInfo, LayerInfo, ServiceInfo};
use sm_observe::LoggerConfig;

/// Daemon configuration, read from the JSON file given as the first argument.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub logger: LoggerConfig,
    pub launcher: LauncherConfig,
    pub runner: ProcRunnerConfig,
    pub storage_path: PathBuf,
    pub services_dir: PathBuf,
    /// Desired state applied once after restoring the stored instances.
    pub desired_state: Option<PathBuf>,
    pub poll_interval_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            launcher: LauncherConfig::default(),
            runner: ProcRunnerConfig::default(),
            storage_path: PathBuf::from("/var/aos/sm/instances.json"),
            services_dir: PathBuf::from("/var/aos/sm/services"),
            desired_state: None,
            poll_interval_ms: 500,
        }
    }
}

impl AgentConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => read_json(path),
            None => Ok(Self::default()),
        }
    }
}

/// Input of one `run_instances` call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DesiredState {
    pub services: Vec<ServiceInfo>,
    pub layers: Vec<LayerInfo>,
    pub instances: Vec<InstanceInfo>,
    pub force_restart: bool,
}

impl DesiredState {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        read_json(path)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<T> {
    let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parse {}", path.display()))
}
