// Error type shared by every channel operation.

use thiserror::Error;

use crate::Core::field::FieldType;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by the record subsystem itself.
///
/// `status` is the subsystem's own status code; it is carried through
/// untouched so callers can match on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status})")]
pub struct DeviceError {
    pub status: i64,
    pub message: String,
}

impl DeviceError {
    pub fn new(status: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Broad classes of failure, used by callers that only care about the kind
/// of problem (and by the C ABI to pick a status code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Detected while building an operation. The operation never existed.
    Configuration,
    /// Bad per-call argument. The operation stays usable.
    InvalidArgument,
    /// Call made in the wrong state (double start, foreign release, ...).
    InvalidState,
    /// Nothing to hand out right now. Only used by the C ABI; `poll`
    /// reports this as `Ok(None)`.
    Unavailable,
    /// The record subsystem reported an error.
    DeviceFailure,
}

/// Errors surfaced by channel operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unsupported field type {0}")]
    UnsupportedType(u16),
    #[error("field {0} in record is not an array")]
    NotAnArray(String),
    #[error("stride must be >0")]
    InvalidStride,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("monitor already started")]
    AlreadyStarted,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("device failure: {0}")]
    Device(#[from] DeviceError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) | Error::UnsupportedType(_) | Error::NotAnArray(_) => {
                ErrorKind::Configuration
            }
            Error::InvalidStride | Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::AlreadyStarted | Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Device(_) => ErrorKind::DeviceFailure,
        }
    }

    pub(crate) fn type_mismatch(expected: FieldType, got: FieldType) -> Self {
        Error::InvalidArgument(format!(
            "element type {:?} does not match field type {:?}",
            got, expected
        ))
    }

    pub(crate) fn destroyed() -> Self {
        Error::InvalidState("operation destroyed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(Error::UnsupportedType(9).kind(), ErrorKind::Configuration);
        assert_eq!(Error::InvalidStride.kind(), ErrorKind::InvalidArgument);
        assert_eq!(Error::AlreadyStarted.kind(), ErrorKind::InvalidState);
        let err: Error = DeviceError::new(-3, "link alarm").into();
        assert_eq!(err.kind(), ErrorKind::DeviceFailure);
        assert_eq!(err.to_string(), "device failure: link alarm (status -3)");
    }
}
