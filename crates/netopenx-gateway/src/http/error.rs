//! Transport-level error classification
//!
//! Every failed attempt against the backend is reduced to an [`HttpError`]
//! whose [`ErrorClassification`] drives the retry policy. The classifier is
//! deliberately ignorant of authentication; the 401 recovery path is layered
//! above it in the client.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthError;

/// Classification of transport outcomes for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClassification {
    /// 4xx other than 401/403 - terminal, retrying cannot help.
    ClientError,
    /// 5xx - transient, retry with backoff.
    ServerError,
    /// Timeout or connection failure - transient, retry with backoff.
    NetworkError,
    /// 401/403 - terminal at the policy level; 401 additionally feeds the
    /// client's forced-refresh path.
    AuthenticationError,
    /// Anything else - terminal by default.
    Unknown,
}

impl ErrorClassification {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClassification::ServerError | ErrorClassification::NetworkError
        )
    }
}

/// Anything the retry policy can make a decision about.
pub trait Classify {
    fn classification(&self) -> ErrorClassification;
}

/// Normalized representation of a failed transport attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpError {
    /// HTTP status code, absent for timeouts and connection failures.
    pub status_code: Option<u16>,
    pub classification: ErrorClassification,
    pub message: String,
    /// Raw response body, kept for the caller's diagnostics.
    pub body: Option<String>,
}

impl HttpError {
    /// Build from a non-success response, consuming its body.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        Self {
            status_code: Some(status.as_u16()),
            classification: Self::classify_status(status),
            message: status
                .canonical_reason()
                .unwrap_or("unrecognized status")
                .to_string(),
            body: Some(body),
        }
    }

    /// Build from a request that never produced a response.
    pub fn from_request_error(error: reqwest::Error) -> Self {
        let classification = if error.is_timeout() || error.is_connect() {
            ErrorClassification::NetworkError
        } else {
            ErrorClassification::Unknown
        };

        Self {
            status_code: None,
            classification,
            message: error.to_string(),
            body: None,
        }
    }

    pub fn classify_status(status: StatusCode) -> ErrorClassification {
        match status.as_u16() {
            401 | 403 => ErrorClassification::AuthenticationError,
            400..=499 => ErrorClassification::ClientError,
            500..=599 => ErrorClassification::ServerError,
            _ => ErrorClassification::Unknown,
        }
    }

    /// True when the peer rejected the bearer token itself.
    pub fn is_unauthorized(&self) -> bool {
        self.status_code == Some(401)
    }
}

impl Classify for HttpError {
    fn classification(&self) -> ErrorClassification {
        self.classification
    }
}

/// Token acquisition runs under the same retry policy as resource calls, so
/// its failures classify the same way: transport trouble is transient, a
/// rejected login or an unreadable body is not.
impl Classify for AuthError {
    fn classification(&self) -> ErrorClassification {
        match self {
            AuthError::Transport { .. } => ErrorClassification::NetworkError,
            AuthError::BackendRejected { status, .. } => {
                match StatusCode::from_u16(*status) {
                    Ok(status) => HttpError::classify_status(status),
                    Err(_) => ErrorClassification::Unknown,
                }
            }
            AuthError::MalformedResponse { .. } => ErrorClassification::ClientError,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "HTTP {} ({})", code, self.message),
            None => write!(f, "transport error: {}", self.message),
        }
    }
}

impl std::error::Error for HttpError {}
