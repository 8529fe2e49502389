use sm_model::{ImageParts, ServiceData, ServiceInfo};

use crate::error::CoreResult;

/// Installs service images and resolves installed services.
pub trait ServiceManager: Send + Sync {
    /// Fetches and unpacks the given services. Already installed versions are kept.
    fn install_services(&self, services: &[ServiceInfo]) -> CoreResult<()>;

    fn get_service(&self, service_id: &str) -> CoreResult<ServiceData>;

    fn get_image_parts(&self, service: &ServiceData) -> CoreResult<ImageParts>;

    fn get_all_services(&self) -> CoreResult<Vec<ServiceData>>;
}
