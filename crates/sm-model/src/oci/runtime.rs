use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::OCI_VERSION;

/// Launch descriptor consumed by the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub oci_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm: Option<Vm>,
}

impl Default for RuntimeSpec {
    fn default() -> Self {
        Self {
            oci_version: OCI_VERSION.to_string(),
            vm: None,
        }
    }
}

impl RuntimeSpec {
    /// Resets the descriptor so it can be reused for the next instance.
    pub fn clear(&mut self) {
        self.oci_version.clear();
        self.oci_version.push_str(OCI_VERSION);
        self.vm = None;
    }

    pub fn kernel_path(&self) -> Option<&PathBuf> {
        self.vm.as_ref().map(|vm| &vm.kernel.path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vm {
    #[serde(default)]
    pub hypervisor: VmHypervisor,
    pub kernel: VmKernel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmHypervisor {
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmKernel {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}
