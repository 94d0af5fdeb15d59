use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no response received from the server: {0}")]
    Network(String),
    #[error("server returned {status}: {}", .error.message)]
    Server { status: u16, error: ApiError },
    #[error("session expired; sign in again")]
    Auth,
    #[error("unexpected response payload from {path}: {message}")]
    Decode { path: String, message: String },
    #[error("no session token; sign in first")]
    NotLoggedIn,
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("failed to build http client: {0}")]
    Config(String),
}

impl ClientError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            error: ApiError::new(ErrorCode::from_status(status), message),
        }
    }

    /// Errors after which the caller has to tear down its session.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Auth | Self::NotLoggedIn)
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Server { error, .. } => Some(error.code),
            Self::Auth | Self::NotLoggedIn => Some(ErrorCode::Unauthorized),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_failures_require_reauth() {
        assert!(ClientError::Auth.requires_reauth());
        assert!(ClientError::NotLoggedIn.requires_reauth());
        assert!(!ClientError::Network("connection refused".into()).requires_reauth());
        assert!(!ClientError::server(500, "boom").requires_reauth());
    }

    #[test]
    fn server_errors_carry_body_message() {
        let err = ClientError::server(404, "process instance not found");
        assert_eq!(err.code(), Some(ErrorCode::NotFound));
        assert_eq!(
            err.to_string(),
            "server returned 404: process instance not found"
        );
    }
}
