use thiserror::Error;

use sm_model::{ErrorKind, StatusError};

use crate::pool::PoolError;

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the launcher core and its collaborators.
///
/// Values are cloneable because the last error of an instance is kept for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("{what} capacity exceeded (limit {limit})")]
    CapacityExceeded { what: &'static str, limit: usize },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("wrong state: {0}")]
    WrongState(String),
    #[error("runner error: {0}")]
    Runner(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("oci error: {0}")]
    Oci(String),
    #[error("service manager error: {0}")]
    ServiceManager(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CoreError::WrongState(_) => ErrorKind::WrongState,
            CoreError::Runner(_) => ErrorKind::Runner,
            CoreError::Io(_) => ErrorKind::Io,
            CoreError::Storage(_) => ErrorKind::Storage,
            CoreError::Oci(_) => ErrorKind::Oci,
            CoreError::ServiceManager(_) => ErrorKind::ServiceManager,
        }
    }

    /// Structural errors abort the whole reconciliation instead of a single instance.
    pub fn is_structural(&self) -> bool {
        matches!(self, CoreError::CapacityExceeded { .. })
    }

    /// Prefixes the message with the originating context, keeping the kind.
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            CoreError::NotFound(m) => CoreError::NotFound(format!("{ctx}: {m}")),
            CoreError::InvalidArgument(m) => CoreError::InvalidArgument(format!("{ctx}: {m}")),
            CoreError::WrongState(m) => CoreError::WrongState(format!("{ctx}: {m}")),
            CoreError::Runner(m) => CoreError::Runner(format!("{ctx}: {m}")),
            CoreError::Io(m) => CoreError::Io(format!("{ctx}: {m}")),
            CoreError::Storage(m) => CoreError::Storage(format!("{ctx}: {m}")),
            CoreError::Oci(m) => CoreError::Oci(format!("{ctx}: {m}")),
            CoreError::ServiceManager(m) => CoreError::ServiceManager(format!("{ctx}: {m}")),
            e @ CoreError::CapacityExceeded { .. } => e,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}

impl From<PoolError> for CoreError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::CapacityExceeded { free, .. } => CoreError::CapacityExceeded {
                what: "task queue",
                limit: free,
            },
            PoolError::TaskTooLarge { limit, .. } => CoreError::CapacityExceeded {
                what: "task size",
                limit,
            },
            other => CoreError::WrongState(other.to_string()),
        }
    }
}

impl From<&CoreError> for StatusError {
    fn from(e: &CoreError) -> Self {
        StatusError::new(e.kind(), e.to_string())
    }
}

impl From<StatusError> for CoreError {
    fn from(e: StatusError) -> Self {
        let m = e.message;
        match e.kind {
            ErrorKind::CapacityExceeded => CoreError::CapacityExceeded {
                what: "runner",
                limit: 0,
            },
            ErrorKind::NotFound => CoreError::NotFound(m),
            ErrorKind::InvalidArgument => CoreError::InvalidArgument(m),
            ErrorKind::WrongState => CoreError::WrongState(m),
            ErrorKind::Runner => CoreError::Runner(m),
            ErrorKind::Io => CoreError::Io(m),
            ErrorKind::Storage => CoreError::Storage(m),
            ErrorKind::Oci => CoreError::Oci(m),
            ErrorKind::ServiceManager => CoreError::ServiceManager(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_kind() {
        let err = CoreError::NotFound("service0".into()).context("instance-3");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "not found: instance-3: service0");
    }

    #[test]
    fn only_capacity_is_structural() {
        assert!(
            CoreError::CapacityExceeded {
                what: "instances",
                limit: 4
            }
            .is_structural()
        );
        assert!(!CoreError::NotFound("x".into()).is_structural());
        assert!(!CoreError::WrongState("x".into()).is_structural());
    }

    #[test]
    fn status_error_roundtrip_keeps_kind() {
        let err = CoreError::Runner("exit code: 1".into());
        let status = StatusError::from(&err);
        assert_eq!(status.kind, ErrorKind::Runner);

        let back = CoreError::from(status);
        assert_eq!(back.kind(), ErrorKind::Runner);
    }

    #[test]
    fn pool_capacity_maps_to_capacity_exceeded() {
        let err = CoreError::from(PoolError::CapacityExceeded { needed: 16, free: 8 });
        assert!(err.is_structural());
    }
}
