use std::{
    path::{Path, PathBuf},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use sm_model::{InstanceId, RuntimeSpec, Vm, VmKernel};

use crate::error::{CoreError, CoreResult};

/// Longest kernel path the scratch region accepts, in bytes.
pub const MAX_KERNEL_PATH: usize = 4096;
/// Most kernel parameters the scratch region accepts.
pub const MAX_KERNEL_PARAMS: usize = 32;

const INSTANCE_ID_PREFIX: &str = "instance-";

struct Scratch {
    spec: RuntimeSpec,
    path: PathBuf,
}

/// Shared by every instance of one launcher: the ID sequence and the runtime descriptor scratch.
///
/// The scratch is allocated once and reused under its own lock, so building a descriptor never
/// grows memory past the configured bounds.
pub struct SpecContext {
    next_id: AtomicU64,
    scratch: Mutex<Scratch>,
}

impl SpecContext {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            scratch: Mutex::new(Scratch {
                spec: RuntimeSpec {
                    vm: Some(Vm {
                        kernel: VmKernel {
                            path: PathBuf::with_capacity(MAX_KERNEL_PATH),
                            parameters: Vec::with_capacity(MAX_KERNEL_PARAMS),
                        },
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                path: PathBuf::with_capacity(MAX_KERNEL_PATH),
            }),
        }
    }

    /// Next `instance-<n>` ID. Unique and increasing for the lifetime of the context.
    pub fn next_instance_id(&self) -> InstanceId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{INSTANCE_ID_PREFIX}{n}")
    }

    /// Fills the scratch descriptor for a unikernel at `fs_root/cmd[0]` and hands it to `save`.
    ///
    /// The lock is held until `save` returns.
    pub fn with_runtime_spec<R>(
        &self,
        fs_root: &Path,
        cmd: &[String],
        save: impl FnOnce(&RuntimeSpec) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let Some((entry, params)) = cmd.split_first() else {
            return Err(CoreError::InvalidArgument("image declares no command".into()));
        };
        if params.len() > MAX_KERNEL_PARAMS {
            return Err(CoreError::CapacityExceeded {
                what: "kernel parameters",
                limit: MAX_KERNEL_PARAMS,
            });
        }

        let mut guard = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
        let Scratch { spec, path } = &mut *guard;

        path.as_mut_os_string().clear();
        path.push(fs_root);
        path.push(entry.trim_start_matches('/'));
        if path.as_os_str().len() > MAX_KERNEL_PATH {
            return Err(CoreError::CapacityExceeded {
                what: "kernel path",
                limit: MAX_KERNEL_PATH,
            });
        }

        let vm = spec.vm.get_or_insert_with(Vm::default);
        vm.kernel.path.as_mut_os_string().clear();
        vm.kernel.path.push(&*path);
        vm.kernel.parameters.clear();
        vm.kernel.parameters.extend(params.iter().cloned());

        save(spec)
    }
}

impl Default for SpecContext {
    fn default() -> Self {
        Self::new()
    }
}
