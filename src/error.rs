//! Error taxonomy for the velocity service
//!
//! Every fallible operation in the crate returns [`ServiceError`]. Errors that
//! travel back to a waiting caller are flattened to an [`ErrorKind`] plus a
//! message inside the reply envelope (see `messages::Reply`).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no response on {subject} within {timeout:?}")]
    Timeout { subject: String, timeout: Duration },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("handler already registered for topic {0}")]
    DuplicateHandler(String),
    #[error("remote {kind} error: {message}")]
    Remote { kind: ErrorKind, message: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Wire-level classification used in error replies
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Decode(_) => ErrorKind::Decode,
            ServiceError::Encode(_) => ErrorKind::Internal,
            ServiceError::Store(_) => ErrorKind::Store,
            ServiceError::Transport(_) => ErrorKind::Transport,
            ServiceError::Timeout { .. } => ErrorKind::Timeout,
            ServiceError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ServiceError::Remote { kind, .. } => *kind,
            ServiceError::DuplicateHandler(_) | ServiceError::Config(_) | ServiceError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout { .. })
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        ServiceError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    Store,
    Transport,
    Timeout,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Decode => "decode",
            ErrorKind::Store => "store",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ServiceError::Decode("x".into()).kind(), ErrorKind::Decode);
        assert_eq!(ServiceError::Store("x".into()).kind(), ErrorKind::Store);
        assert_eq!(
            ServiceError::InvalidRequest("x".into()).kind(),
            ErrorKind::InvalidRequest
        );
        let remote = ServiceError::Remote {
            kind: ErrorKind::Store,
            message: "disk full".into(),
        };
        assert_eq!(remote.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_json_errors_are_decode_errors() {
        let err: ServiceError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ServiceError::Decode(_)));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidRequest).unwrap();
        assert_eq!(json, r#""invalid_request""#);
    }
}
