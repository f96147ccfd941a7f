use parley_core::OracleError;
use thiserror::Error;

/// Failure talking to a chat backend, classified by cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::RateLimit, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Server, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidRequest, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Decode, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Connection failures
    Network,
    /// Request exceeded its time limit
    Timeout,
    /// 429
    RateLimit,
    /// 5xx
    Server,
    /// 401 / 403
    Auth,
    /// Other 4xx
    InvalidRequest,
    /// Response body did not have the expected shape
    Decode,
}

impl From<BackendError> for OracleError {
    fn from(err: BackendError) -> Self {
        match err.kind {
            BackendErrorKind::Decode => OracleError::Malformed(err.message),
            _ => OracleError::Unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_decode_failures_are_malformed() {
        assert_eq!(
            OracleError::from(BackendError::decode("no choices")),
            OracleError::Malformed("no choices".to_string())
        );
        for err in [
            BackendError::network("refused"),
            BackendError::timeout("slow"),
            BackendError::rate_limit("429"),
            BackendError::server("502"),
            BackendError::auth("401"),
            BackendError::invalid_request("400"),
        ] {
            assert!(matches!(OracleError::from(err), OracleError::Unavailable(_)));
        }
    }
}
