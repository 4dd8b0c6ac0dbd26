//! Error types surfaced by the gateway
//!
//! Two taxonomies cross the crate boundary: [`AuthError`] from the token
//! manager and [`ApiError`] from the resource-call path. Transport-level
//! classification lives in [`crate::http::HttpError`] and never escapes
//! directly.

use thiserror::Error;

use crate::http::HttpError;

/// Failures raised while acquiring a bearer token.
///
/// `Clone` is required: a single login outcome is shared verbatim with every
/// caller coalesced onto the same in-flight refresh.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The token endpoint answered with a non-success status.
    #[error("login rejected by backend (status {status}): {message}")]
    BackendRejected { status: u16, message: String },

    /// The token endpoint answered 2xx but the body was unusable.
    #[error("malformed login response: {detail}")]
    MalformedResponse { detail: String },

    /// The login request never produced an HTTP response.
    #[error("login transport failure: {message}")]
    Transport { message: String },
}

/// Failures raised by a resource call through the gateway.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Token acquisition failed (after the retry policy ran its course);
    /// no transport call was attempted.
    #[error("authentication failed: {0}")]
    Unauthenticated(#[source] AuthError),

    /// The backend answered with a terminal non-success status.
    #[error("backend rejected request (status {status})")]
    BackendRejected { status: u16, body: String },

    /// A 2xx response carried a body that could not be parsed as JSON.
    #[error("malformed backend response: {detail}")]
    MalformedResponse { detail: String },

    /// A retryable failure survived the full attempt ceiling.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, #[source] last: HttpError },
}

/// Failures constructing the gateway itself. These happen once at startup,
/// never on the request path.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {name} is not set")]
    MissingEnvVar { name: String },

    #[error("invalid base URL {url:?}: {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("failed to construct HTTP client: {message}")]
    HttpClient { message: String },
}
