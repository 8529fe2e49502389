//! Capabilities the launcher consumes from the rest of the system.
//!
//! Every trait is object safe and shared as `Arc<dyn Trait>`; implementations must be callable
//! from several worker threads at once.

mod oci;
pub use oci::OciManager;

mod receiver;
pub use receiver::{RunStatusReceiver, StatusReceiver};

mod runner;
pub use runner::Runner;

mod service_manager;
pub use service_manager::ServiceManager;

mod storage;
pub use storage::Storage;
