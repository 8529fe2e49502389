mod error;
pub use error::{ExecError, ExecResult};

pub mod oci;
pub use oci::JsonOciManager;

#[cfg(feature = "proc")]
pub mod proc;
#[cfg(feature = "proc")]
pub use proc::{ProcRunner, ProcRunnerConfig};

pub mod service;
pub use service::FsServiceManager;

pub mod storage;
pub use storage::JsonStorage;

pub mod utils;

mod fsutil;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{FsServiceManager, JsonOciManager, JsonStorage};
    #[cfg(feature = "proc")]
    pub use crate::{ProcRunner, ProcRunnerConfig};
}
