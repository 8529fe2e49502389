//! Image and runtime descriptors exchanged with the OCI manager and the runner.
//!
//! Only the subset needed to launch unikernel style workloads is modelled: the image config
//! entry command and the VM section of the runtime spec.

mod image;
pub use image::{ImageConfig, ImageSpec};

mod runtime;
pub use runtime::{RuntimeSpec, Vm, VmHypervisor, VmKernel};

/// Runtime descriptor file name inside an instance directory.
pub const RUNTIME_SPEC_FILE: &str = "config.json";

/// OCI runtime spec version written into generated descriptors.
pub const OCI_VERSION: &str = "1.0.2";
