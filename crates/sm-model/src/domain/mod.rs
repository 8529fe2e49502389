mod version;
pub use version::VersionInfo;

mod service;
pub use service::{ImageParts, ServiceData, ServiceInfo};

mod layer;
pub use layer::LayerInfo;

mod instance_ident;
pub use instance_ident::InstanceIdent;

mod instance_info;
pub use instance_info::InstanceInfo;

mod instance_state;
pub use instance_state::InstanceState;

mod run_status;
pub use run_status::{ErrorKind, RunStatus, RunnerStatus, StatusError};

/// Service identifier as assigned by the cloud.
pub type ServiceId = String;

/// Generated runtime identifier of an instance (`instance-<sequence>`).
pub type InstanceId = String;
