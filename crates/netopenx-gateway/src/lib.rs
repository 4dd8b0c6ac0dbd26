//! Resilient authenticated gateway for the NetOpenX ERP REST API
//!
//! This crate sits between thin application handlers and the NetOpenX
//! backend and owns everything with real state and failure handling:
//!
//! - **Token manager**: obtains a bearer token via form-encoded login,
//!   caches it with a sub-expiry validity window, and coalesces concurrent
//!   refreshes into a single login request (single-flight).
//! - **Resilient invoker**: typed `get`/`post`/`put`/`delete` operations
//!   with exponential-backoff retry around every network round-trip, one
//!   forced token refresh on backend-side 401s, and normalization of the
//!   backend's inconsistent response envelopes (`Data`/`items`/`value`/bare)
//!   into a single predictable shape.
//!
//! Domain decoding is left to callers; the gateway hands back plain
//! [`serde_json::Value`] payloads.
//!
//! # Example
//!
//! ```no_run
//! use netopenx_gateway::{GatewayClient, GatewayConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env()?;
//! let client = GatewayClient::with_default_config(config)?;
//!
//! let cariler = client
//!     .get_with_query("ARPs", &[("limit", "50"), ("sort", "CARI_KOD ASC")])
//!     .await?;
//! println!("{cariler}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;

pub use config::GatewayConfig;
pub use error::{ApiError, AuthError, ConfigError};
pub use http::{
    normalize_envelope, ErrorClassification, GatewayClient, GatewayClientConfig, HttpError,
    Method, RetryPolicy, TokenManager, TOKEN_VALIDITY,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
