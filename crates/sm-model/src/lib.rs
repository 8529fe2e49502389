mod domain;
pub use domain::*;

pub mod oci;
pub use oci::{ImageConfig, ImageSpec, OCI_VERSION, RUNTIME_SPEC_FILE, RuntimeSpec, Vm, VmHypervisor, VmKernel};
