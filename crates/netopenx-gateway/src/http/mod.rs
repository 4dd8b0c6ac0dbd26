//! HTTP gateway internals
//!
//! - Token acquisition, caching and single-flight refresh
//! - Retry with exponential backoff around every network round-trip
//! - Transport error classification
//! - Response envelope normalization

pub mod client;
pub mod error;
pub mod normalizer;
pub mod retry;
pub mod token;

pub use client::{GatewayClient, GatewayClientConfig};
pub use error::{Classify, ErrorClassification, HttpError};
pub use normalizer::normalize_envelope;
pub use retry::{execute_with_retry, RetryDecision, RetryHandler, RetryPolicy};
pub use token::{TokenManager, TOKEN_VALIDITY};

// Re-export commonly used transport types.
pub use reqwest::{Method, StatusCode};
