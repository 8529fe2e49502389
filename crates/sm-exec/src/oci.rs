//! OCI descriptors stored as JSON files.

use std::{fs, path::Path};

use sm_core::{CoreError, CoreResult, OciManager};
use sm_model::{ImageSpec, RuntimeSpec};
use tracing::trace;

use crate::{error::ExecError, fsutil};

/// Reads image descriptors and writes runtime descriptors as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonOciManager;

impl JsonOciManager {
    pub fn new() -> Self {
        Self
    }
}

impl OciManager for JsonOciManager {
    fn load_image_spec(&self, path: &Path) -> CoreResult<ImageSpec> {
        trace!(path = %path.display(), "load image spec");

        let data = fs::read(path).map_err(|e| ExecError::from(e).into_core(CoreError::Oci))?;
        serde_json::from_slice(&data)
            .map_err(|e| ExecError::from(e).into_core(CoreError::Oci).context(path.display()))
    }

    fn save_runtime_spec(&self, path: &Path, spec: &RuntimeSpec) -> CoreResult<()> {
        trace!(path = %path.display(), "save runtime spec");

        let data = serde_json::to_vec_pretty(spec).map_err(|e| ExecError::from(e).into_core(CoreError::Oci))?;
        fsutil::write_atomic(path, &data).map_err(|e| ExecError::from(e).into_core(CoreError::Oci).context(path.display()))
    }
}
