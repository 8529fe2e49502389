//! Service images installed into a local directory tree.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<service_id>/service.json         installed ServiceData
//! <root>/<service_id>/<aos_version>/       unpacked image
//!     image.json                           OCI image config
//!     service.json                         service config
//!     rootfs/                              service filesystem
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use sm_core::{CoreError, CoreResult, ServiceManager};
use sm_model::{ImageParts, ServiceData, ServiceInfo};
use tracing::{debug, info, warn};

use crate::{
    error::{ExecError, ExecResult},
    fsutil,
};

const SERVICE_DATA_FILE: &str = "service.json";
const IMAGE_CONFIG_FILE: &str = "image.json";
const SERVICE_CONFIG_FILE: &str = "service.json";
const ROOTFS_DIR: &str = "rootfs";
const FILE_SCHEME: &str = "file://";

/// Installs services from unpacked image directories referenced by `file://` URLs or plain paths.
pub struct FsServiceManager {
    root: PathBuf,
    /// Serializes installs.
    install: Mutex<()>,
}

impl FsServiceManager {
    pub fn new(root: impl Into<PathBuf>) -> ExecResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            install: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn service_dir(&self, service_id: &str) -> PathBuf {
        self.root.join(service_id)
    }

    fn read_data(&self, service_id: &str) -> ExecResult<ServiceData> {
        let path = self.service_dir(service_id).join(SERVICE_DATA_FILE);
        let data = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ExecError::NotFound(format!("service {service_id}")),
            _ => ExecError::from(e),
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn install_one(&self, info: &ServiceInfo) -> ExecResult<()> {
        if info.service_id.is_empty() || info.service_id.contains(['/', '\\']) || info.service_id.starts_with('.') {
            return Err(ExecError::InvalidData(format!("bad service id {:?}", info.service_id)));
        }

        let current = self.read_data(&info.service_id).ok();
        if let Some(current) = &current
            && current.version.aos_version == info.version.aos_version
            && current.image_path.is_dir()
        {
            debug!(service = %info.service_id, version = info.version.aos_version, "service already installed");
            return Ok(());
        }

        let source = source_path(&info.url)?;
        if !source.join(IMAGE_CONFIG_FILE).is_file() {
            return Err(ExecError::InvalidData(format!(
                "{} has no {IMAGE_CONFIG_FILE}",
                source.display()
            )));
        }

        let service_dir = self.service_dir(&info.service_id);
        let version_dir = service_dir.join(info.version.aos_version.to_string());
        let staging = service_dir.join(format!(".{}.staging", info.version.aos_version));

        fsutil::remove_dir(&staging)?;
        fsutil::copy_dir(&source, &staging).inspect_err(|_| {
            let _ = fsutil::remove_dir(&staging);
        })?;
        fsutil::remove_dir(&version_dir)?;
        fs::rename(&staging, &version_dir)?;

        let data = ServiceData {
            service_id: info.service_id.clone(),
            provider_id: info.provider_id.clone(),
            version: info.version.clone(),
            image_path: version_dir.clone(),
        };
        fsutil::write_atomic(&service_dir.join(SERVICE_DATA_FILE), &serde_json::to_vec_pretty(&data)?)?;

        let previous = current.map(|c| c.image_path).filter(|p| *p != version_dir);
        self.prune(&service_dir, &version_dir, previous.as_deref());
        info!(service = %info.service_id, version = info.version.aos_version, "service installed");
        Ok(())
    }

    /// Removes image versions other than `keep` and the one it replaces.
    ///
    /// Instances of the replaced version are still running until the launcher restarts them, so
    /// that image survives until the next install of this service.
    fn prune(&self, service_dir: &Path, keep: &Path, previous: Option<&Path>) {
        let Ok(entries) = fs::read_dir(service_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir()
                && path != keep
                && Some(path.as_path()) != previous
                && let Err(e) = fsutil::remove_dir(&path)
            {
                warn!(path = %path.display(), error = %e, "failed to remove old service version");
            }
        }
    }
}

fn source_path(url: &str) -> ExecResult<PathBuf> {
    let path = url.strip_prefix(FILE_SCHEME).unwrap_or(url);
    if path.is_empty() || path.contains("://") {
        return Err(ExecError::InvalidData(format!("unsupported service url {url:?}")));
    }
    Ok(PathBuf::from(path))
}

impl ServiceManager for FsServiceManager {
    fn install_services(&self, services: &[ServiceInfo]) -> CoreResult<()> {
        let _guard = self.install.lock().unwrap_or_else(PoisonError::into_inner);

        let mut first = None;
        for info in services {
            if let Err(e) = self.install_one(info) {
                warn!(service = %info.service_id, error = %e, "failed to install service");
                first.get_or_insert_with(|| e.into_core(CoreError::ServiceManager).context(&info.service_id));
            }
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn get_service(&self, service_id: &str) -> CoreResult<ServiceData> {
        self.read_data(service_id)
            .map_err(|e| e.into_core(CoreError::ServiceManager))
    }

    fn get_image_parts(&self, service: &ServiceData) -> CoreResult<ImageParts> {
        if !service.image_path.is_dir() {
            return Err(CoreError::NotFound(format!(
                "image of {} at {}",
                service.service_id,
                service.image_path.display()
            )));
        }

        Ok(ImageParts {
            image_config_path: service.image_path.join(IMAGE_CONFIG_FILE),
            service_config_path: service.image_path.join(SERVICE_CONFIG_FILE),
            service_fs_path: service.image_path.join(ROOTFS_DIR),
        })
    }

    fn get_all_services(&self) -> CoreResult<Vec<ServiceData>> {
        let entries = fs::read_dir(&self.root).map_err(|e| CoreError::ServiceManager(e.to_string()))?;

        let mut services = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.read_data(&id) {
                Ok(data) => services.push(data),
                Err(ExecError::NotFound(_)) => {}
                Err(e) => warn!(service = %id, error = %e, "skipping unreadable service"),
            }
        }

        services.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        Ok(services)
    }
}
