//! Resilient API invoker
//!
//! Composes the token manager, the retry policy and the pooled transport
//! into typed `get`/`post`/`put`/`delete` operations against ERP resource
//! paths. Every network round-trip (token acquisition included) runs under
//! the retry policy; response envelopes are normalized before the payload is
//! returned.

use reqwest::{Client as ReqwestClient, Method, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{ApiError, ConfigError};
use crate::http::error::{Classify, HttpError};
use crate::http::normalizer::normalize_envelope;
use crate::http::retry::{execute_with_retry, RetryPolicy};
use crate::http::token::TokenManager;

/// Configuration for the gateway client.
#[derive(Debug, Clone)]
pub struct GatewayClientConfig {
    /// Retry policy applied around every network round-trip.
    pub retry_policy: RetryPolicy,
    /// Per-request transport timeout.
    pub timeout: Duration,
}

impl Default for GatewayClientConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Authenticated, retrying client for NetOpenX resource endpoints.
#[derive(Clone)]
pub struct GatewayClient {
    http: ReqwestClient,
    tokens: TokenManager,
    config: GatewayClientConfig,
    base_url: String,
}

impl GatewayClient {
    /// Build a client and its token manager over one connection pool.
    pub fn new(
        gateway_config: GatewayConfig,
        client_config: GatewayClientConfig,
    ) -> Result<Self, ConfigError> {
        Url::parse(&gateway_config.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: gateway_config.base_url.clone(),
            message: e.to_string(),
        })?;

        let http = ReqwestClient::builder()
            .timeout(client_config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                message: e.to_string(),
            })?;

        let base_url = gateway_config.trimmed_base_url().to_string();
        let tokens = TokenManager::new(Arc::new(gateway_config), http.clone());

        Ok(Self {
            http,
            tokens,
            config: client_config,
            base_url,
        })
    }

    /// Build with the default retry policy and timeout.
    pub fn with_default_config(gateway_config: GatewayConfig) -> Result<Self, ConfigError> {
        Self::new(gateway_config, GatewayClientConfig::default())
    }

    /// Build around an existing token manager (shares its cache).
    pub fn with_token_manager(
        tokens: TokenManager,
        http: ReqwestClient,
        base_url: &str,
        config: GatewayClientConfig,
    ) -> Self {
        Self {
            http,
            tokens,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The token manager backing this client.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(Method::GET, path, None, &[]).await
    }

    /// GET with query parameters, e.g. `limit` / `sort` on list endpoints.
    pub async fn get_with_query(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        self.execute(Method::GET, path, None, query).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.execute(Method::POST, path, Some(body), &[]).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.execute(Method::PUT, path, Some(body), &[]).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(Method::DELETE, path, None, &[]).await
    }

    /// Execute one resource call: acquire a token, send under the retry
    /// policy, recover once from a backend-side token rejection, and
    /// normalize the response envelope.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        let token = execute_with_retry(
            || async { self.tokens.get_token().await },
            self.config.retry_policy.clone(),
        )
        .await
        .map_err(ApiError::Unauthenticated)?;

        let outcome = execute_with_retry(
            || {
                let method = method.clone();
                let token = token.clone();
                async move { self.send(method, path, body, query, &token).await }
            },
            self.config.retry_policy.clone(),
        )
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(error) if error.is_unauthorized() => {
                // The backend rejected a token our clock says is valid
                // (backend-side revocation). Force one refresh and retry the
                // call exactly once, outside the retry policy.
                tracing::warn!(path, "backend rejected bearer token, refreshing once");
                let fresh = self
                    .tokens
                    .force_refresh()
                    .await
                    .map_err(ApiError::Unauthenticated)?;
                self.send(method, path, body, query, &fresh)
                    .await
                    .map_err(|e| self.resend_error(e))?
            }
            Err(error) => return Err(self.into_api_error(error)),
        };

        self.decode(response).await
    }

    /// One transport round-trip. Non-2xx statuses become [`HttpError`] so
    /// the retry policy can classify them.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<Response, HttpError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let mut request = self.http.request(method, &url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(HttpError::from_request_error)?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(HttpError::from_response(response).await)
        }
    }

    /// Parse a 2xx body as JSON and unwrap the envelope. Empty bodies (e.g.
    /// DELETE acknowledgements) decode to `null`.
    async fn decode(&self, response: Response) -> Result<Value, ApiError> {
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::MalformedResponse {
                detail: e.to_string(),
            })?;

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        let parsed: Value =
            serde_json::from_str(&body).map_err(|_| ApiError::MalformedResponse {
                detail: format!("response body is not valid JSON: {body}"),
            })?;

        Ok(normalize_envelope(parsed))
    }

    /// Map a failure that escaped the retry loop into the caller-facing
    /// taxonomy.
    ///
    /// Within the loop a retryable classification can only escape by
    /// exhausting the ceiling, so it maps to `RetriesExhausted`; everything
    /// else is a plain backend rejection.
    fn into_api_error(&self, error: HttpError) -> ApiError {
        if error.classification().is_retryable() {
            ApiError::RetriesExhausted {
                attempts: self.config.retry_policy.max_retries + 1,
                last: error,
            }
        } else {
            ApiError::BackendRejected {
                status: error.status_code.unwrap_or(0),
                body: error.body.unwrap_or_default(),
            }
        }
    }

    /// Map a failure of the post-refresh resend, which is a single attempt
    /// outside the retry loop: any status the backend returned is a plain
    /// rejection, and a transport-level failure gives up after the two
    /// attempts this call actually made (the rejected send plus the resend).
    fn resend_error(&self, error: HttpError) -> ApiError {
        match error.status_code {
            Some(status) => ApiError::BackendRejected {
                status,
                body: error.body.unwrap_or_default(),
            },
            None => ApiError::RetriesExhausted { attempts: 2, last: error },
        }
    }
}
