//! POSIX rlimit-based resource limits for workload processes.
//!
//! On Unix the limits are applied inside a `pre_exec` hook, in the child after `fork()` and
//! right before `execve()`, so the workload never runs unrestricted. Elsewhere a non-empty
//! configuration is logged and ignored.
use std::process::Command;

use serde::Deserialize;
#[cfg(not(unix))]
use tracing::warn;

/// Declarative rlimits for a child process. `None` leaves the inherited limit unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RlimitConfig {
    /// `RLIMIT_NOFILE`.
    pub max_open_files: Option<u64>,

    /// `RLIMIT_FSIZE`, in bytes. Growing a file past it usually ends the process with `SIGXFSZ`.
    pub max_file_size_bytes: Option<u64>,

    /// `RLIMIT_AS`, in bytes.
    pub max_address_space_bytes: Option<u64>,

    /// Sets `RLIMIT_CORE = 0`.
    pub disable_core_dumps: bool,
}

impl RlimitConfig {
    /// Returns `true` if no explicit limits are configured.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_open_files.is_none()
            && self.max_file_size_bytes.is_none()
            && self.max_address_space_bytes.is_none()
            && !self.disable_core_dumps
    }
}

/// Attaches the limits to `cmd`.
pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
    if config.is_empty() {
        return;
    }

    #[cfg(unix)]
    {
        unix_impl::attach_rlimits(cmd, config);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
        warn!(
            target: "sm_exec::limits",
            ?config,
            "rlimit-based process limits requested on a non-Unix OS; limits will be ignored"
        );
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::{io, os::unix::process::CommandExt, process::Command};

    use super::RlimitConfig;

    pub(super) fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
        let RlimitConfig {
            max_open_files,
            max_file_size_bytes,
            max_address_space_bytes,
            disable_core_dumps,
        } = config.clone();

        // SAFETY: the hook only calls `setrlimit`, which is async-signal-safe.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(nofile) = max_open_files {
                    apply_rlimit(libc::RLIMIT_NOFILE, nofile)?;
                }
                if let Some(fsize) = max_file_size_bytes {
                    apply_rlimit(libc::RLIMIT_FSIZE, fsize)?;
                }
                if let Some(bytes) = max_address_space_bytes {
                    apply_rlimit(libc::RLIMIT_AS, bytes)?;
                }
                if disable_core_dumps {
                    apply_rlimit(libc::RLIMIT_CORE, 0)?;
                }
                Ok(())
            });
        }
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    type Resource = libc::__rlimit_resource_t;
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    type Resource = libc::c_int;

    fn apply_rlimit(resource: Resource, value: u64) -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };

        // SAFETY: `rlim` is a valid, initialized struct for the duration of the call.
        let rc = unsafe { libc::setrlimit(resource, &rlim) };
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}
