mod config;

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use tracing::{info, warn};

use sm_core::{Collaborators, Launcher, RunStatusReceiver};
use sm_exec::{FsServiceManager, JsonOciManager, JsonStorage, ProcRunner};
use sm_observe::{StatusLog, logger_init};

use crate::config::{AgentConfig, DesiredState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Config + logger
    let path = env::args_os().nth(1).map(PathBuf::from);
    let cfg = AgentConfig::load(path.as_deref())?;
    logger_init(&cfg.logger)?;
    info!("logger initialized");

    // 2) Collaborators
    let runner = Arc::new(ProcRunner::new(cfg.runner.clone()));
    let deps = Collaborators {
        service_manager: Arc::new(FsServiceManager::new(&cfg.services_dir)?),
        runner: runner.clone(),
        oci: Arc::new(JsonOciManager::new()),
        storage: Arc::new(JsonStorage::open(&cfg.storage_path)?),
        status_receiver: Arc::new(StatusLog::new()),
    };

    // 3) Launcher
    let launcher = Arc::new(Launcher::new(cfg.launcher.clone(), deps)?);
    info!("launcher ready");

    // 4) Restore what was running before
    let l = Arc::clone(&launcher);
    if let Err(e) = tokio::task::spawn_blocking(move || l.run_last_instances()).await? {
        warn!(error = %e, "failed to restore last instances");
    }

    // 5) Apply the configured desired state
    if let Some(path) = &cfg.desired_state {
        let desired = DesiredState::load(path)?;
        let l = Arc::clone(&launcher);
        tokio::task::spawn_blocking(move || {
            l.run_instances(&desired.services, &desired.layers, &desired.instances, desired.force_restart)
        })
        .await??;
    }

    // 6) Feed process exits back until Ctrl+C
    info!("press Ctrl+C to stop");
    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.poll_interval_ms.max(10)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let exited = runner.poll_exited();
                if !exited.is_empty()
                    && let Err(e) = launcher.update_run_status(&exited)
                {
                    warn!(error = %e, "failed to report exited instances");
                }
            }
            res = tokio::signal::ctrl_c() => {
                res?;
                break;
            }
        }
    }

    info!("shutting down...");
    let l = Arc::clone(&launcher);
    tokio::task::spawn_blocking(move || l.shutdown()).await??;

    Ok(())
}
