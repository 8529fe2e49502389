mod cache;
pub use cache::{ServiceCache, ServiceRefresh};

mod layer;
pub use layer::{LayerCache, LayerRefresh};

use std::{fmt, path::Path};

use sm_model::{ImageParts, ImageSpec, ServiceData};

use crate::{
    api::{OciManager, ServiceManager},
    error::CoreResult,
};

/// Installed service resolved to everything an instance needs to build its runtime descriptor.
#[derive(Debug, Clone)]
pub struct Service {
    data: ServiceData,
    parts: ImageParts,
    image_spec: ImageSpec,
}

impl Service {
    pub fn new(data: ServiceData, parts: ImageParts, image_spec: ImageSpec) -> Self {
        Self {
            data,
            parts,
            image_spec,
        }
    }

    /// Looks the service up in the service manager and loads its image descriptor.
    pub fn resolve(
        manager: &dyn ServiceManager,
        oci: &dyn OciManager,
        service_id: &str,
    ) -> CoreResult<Self> {
        let data = manager.get_service(service_id)?;
        let parts = manager.get_image_parts(&data)?;
        let image_spec = oci
            .load_image_spec(&parts.image_config_path)
            .map_err(|e| e.context(format!("image spec of {service_id}")))?;

        Ok(Self::new(data, parts, image_spec))
    }

    pub fn service_id(&self) -> &str {
        &self.data.service_id
    }

    /// Version fingerprint.
    pub fn version(&self) -> u64 {
        self.data.version.aos_version
    }

    pub fn data(&self) -> &ServiceData {
        &self.data
    }

    pub fn image_spec(&self) -> &ImageSpec {
        &self.image_spec
    }

    /// Root of the unpacked service filesystem.
    pub fn service_fs_path(&self) -> &Path {
        &self.parts.service_fs_path
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:v{}", self.data.service_id, self.version())
    }
}
