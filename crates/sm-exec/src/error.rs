use std::io;

use thiserror::Error;

use sm_core::CoreError;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("non-zero exit code: {code}")]
    NonZeroExit { code: i32 },
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("killed by signal")]
    KilledBySignal,
    #[error("missing program")]
    MissingProgram,
    #[error("json error: {0}")]
    Json(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<io::Error> for ExecError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => ExecError::NotFound(e.to_string()),
            _ => ExecError::Io(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(e: serde_json::Error) -> Self {
        ExecError::Json(e.to_string())
    }
}

impl From<ExecError> for CoreError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::NotFound(m) => CoreError::NotFound(m),
            ExecError::InvalidData(m) => CoreError::InvalidArgument(m),
            ExecError::Io(m) => CoreError::Io(m),
            other => CoreError::Runner(other.to_string()),
        }
    }
}

impl ExecError {
    /// Maps to a core error, using `wrap` for everything but missing entries.
    pub(crate) fn into_core(self, wrap: fn(String) -> CoreError) -> CoreError {
        match self {
            ExecError::NotFound(m) => CoreError::NotFound(m),
            other => wrap(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_maps_to_not_found() {
        let err = ExecError::from(io::Error::new(io::ErrorKind::NotFound, "config.json"));
        assert!(matches!(CoreError::from(err), CoreError::NotFound(_)));
    }

    #[test]
    fn into_core_keeps_not_found() {
        let err = ExecError::NotFound("x".into()).into_core(CoreError::Storage);
        assert!(matches!(err, CoreError::NotFound(_)));

        let err = ExecError::Json("eof".into()).into_core(CoreError::Storage);
        assert!(matches!(err, CoreError::Storage(_)));
    }
}
