use std::path::Path;

use sm_model::{ImageSpec, RuntimeSpec};

use crate::error::CoreResult;

/// Reads and writes OCI descriptors.
pub trait OciManager: Send + Sync {
    fn load_image_spec(&self, path: &Path) -> CoreResult<ImageSpec>;

    fn save_runtime_spec(&self, path: &Path, spec: &RuntimeSpec) -> CoreResult<()>;
}
