//! Pipeline error taxonomy
//!
//! Every stage converts its own failures into this taxonomy at the RPC
//! boundary; a raw error never crosses a service boundary. The wire form is
//! an [`ErrorBody`] JSON object carried with the matching HTTP status.

use serde::{Deserialize, Serialize};

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Fixed error taxonomy shared by all stage services and clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Taxonomy tag as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Unauthenticated,
    Unavailable,
    InvalidArgument,
    Internal,
    Unknown,
}

/// JSON error payload exchanged between services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Self::Unavailable(_) => ErrorCode::Unavailable,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Internal(_) => ErrorCode::Internal,
            Self::Unknown(_) => ErrorCode::Unknown,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m)
            | Self::Unauthenticated(m)
            | Self::Unavailable(m)
            | Self::InvalidArgument(m)
            | Self::Internal(m)
            | Self::Unknown(m) => m,
        }
    }

    /// HTTP status used at the internal RPC boundary.
    pub fn rpc_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Unauthenticated(_) => 401,
            Self::Unavailable(_) => 503,
            Self::InvalidArgument(_) => 400,
            Self::Internal(_) | Self::Unknown(_) => 500,
        }
    }

    /// Transport status the gateway exposes for this error.
    pub fn gateway_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Unauthenticated(_) => 502,
            Self::Unavailable(_) => 503,
            Self::InvalidArgument(_) => 400,
            Self::Internal(_) | Self::Unknown(_) => 502,
        }
    }

    /// Classify an HTTP status when no [`ErrorBody`] could be decoded.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            401 | 403 => Self::Unauthenticated(message),
            400 | 422 => Self::InvalidArgument(message),
            500..=599 => Self::Unavailable(message),
            _ => Self::Unknown(message),
        }
    }
}

impl From<ErrorBody> for PipelineError {
    fn from(body: ErrorBody) -> Self {
        match body.code {
            ErrorCode::NotFound => Self::NotFound(body.message),
            ErrorCode::Unauthenticated => Self::Unauthenticated(body.message),
            ErrorCode::Unavailable => Self::Unavailable(body.message),
            ErrorCode::InvalidArgument => Self::InvalidArgument(body.message),
            ErrorCode::Internal => Self::Internal(body.message),
            ErrorCode::Unknown => Self::Unknown(body.message),
        }
    }
}

impl From<&PipelineError> for ErrorBody {
    fn from(err: &PipelineError) -> Self {
        Self {
            code: err.code(),
            message: err.message().to_string(),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Unavailable(err.to_string())
        } else if err.is_decode() {
            Self::Internal(err.to_string())
        } else {
            Self::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip() {
        let err = PipelineError::NotFound("symbol FAKE not found".to_string());
        let body = ErrorBody::from(&err);
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"not_found\""));

        let decoded: ErrorBody = serde_json::from_str(&json).unwrap();
        assert_eq!(PipelineError::from(decoded), err);
    }

    #[test]
    fn test_rpc_status_mapping() {
        assert_eq!(PipelineError::NotFound(String::new()).rpc_status(), 404);
        assert_eq!(PipelineError::Unauthenticated(String::new()).rpc_status(), 401);
        assert_eq!(PipelineError::Unavailable(String::new()).rpc_status(), 503);
        assert_eq!(PipelineError::InvalidArgument(String::new()).rpc_status(), 400);
        assert_eq!(PipelineError::Internal(String::new()).rpc_status(), 500);
        assert_eq!(PipelineError::Unknown(String::new()).rpc_status(), 500);
    }

    #[test]
    fn test_gateway_status_mapping() {
        assert_eq!(PipelineError::NotFound(String::new()).gateway_status(), 404);
        assert_eq!(PipelineError::Unauthenticated(String::new()).gateway_status(), 502);
        assert_eq!(PipelineError::InvalidArgument(String::new()).gateway_status(), 400);
        assert_eq!(PipelineError::Unavailable(String::new()).gateway_status(), 503);
        assert_eq!(PipelineError::Internal(String::new()).gateway_status(), 502);
        assert_eq!(PipelineError::Unknown(String::new()).gateway_status(), 502);
    }

    #[test]
    fn test_from_status_fallback() {
        assert_eq!(
            PipelineError::from_status(404, "gone").code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            PipelineError::from_status(502, "bad gateway").code(),
            ErrorCode::Unavailable
        );
        assert_eq!(
            PipelineError::from_status(418, "teapot").code(),
            ErrorCode::Unknown
        );
    }
}
