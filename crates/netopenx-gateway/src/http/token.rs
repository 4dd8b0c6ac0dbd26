//! Bearer token acquisition and caching
//!
//! Owns the process-wide token cache and guarantees single-flight refresh:
//! any number of concurrent callers observing a missing or expired token
//! converge on one login request and share its outcome. Coalescing uses a
//! shared future that late arrivals attach to, not lock-and-recheck, and the
//! login itself runs on a spawned task so a caller abandoning its own
//! request cannot cancel a refresh other callers depend on.
//!
//! Login failures are not retried here; the client layers the retry policy
//! around token acquisition the same way it wraps resource calls.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::config::{GatewayConfig, GRANT_TYPE};
use crate::error::AuthError;

/// How long an issued token is trusted. Deliberately shorter than the
/// backend's real token lifetime as a safety margin; the backend's
/// `expires_in` claim is ignored.
pub const TOKEN_VALIDITY: Duration = Duration::from_secs(20 * 60);

struct CachedToken {
    token: String,
    issued_at: Instant,
}

impl CachedToken {
    fn is_valid(&self, validity: Duration) -> bool {
        self.issued_at.elapsed() < validity
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<String, AuthError>>>;

struct TokenState {
    cached: RwLock<Option<CachedToken>>,
    /// At most one refresh is in flight process-wide; concurrent demanders
    /// clone and await this future instead of starting their own.
    in_flight: Mutex<Option<RefreshFuture>>,
}

/// Handle for obtaining bearer tokens. Cheap to clone; all clones share the
/// same cache and in-flight state.
#[derive(Clone)]
pub struct TokenManager {
    config: Arc<GatewayConfig>,
    http: reqwest::Client,
    validity: Duration,
    state: Arc<TokenState>,
}

impl TokenManager {
    pub fn new(config: Arc<GatewayConfig>, http: reqwest::Client) -> Self {
        Self::with_validity(config, http, TOKEN_VALIDITY)
    }

    /// Override the validity window. Production code wants [`TOKEN_VALIDITY`];
    /// short windows are useful when exercising expiry behavior.
    pub fn with_validity(
        config: Arc<GatewayConfig>,
        http: reqwest::Client,
        validity: Duration,
    ) -> Self {
        Self {
            config,
            http,
            validity,
            state: Arc::new(TokenState {
                cached: RwLock::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Return the cached token, or acquire one.
    ///
    /// A cache hit involves no I/O and no exclusive locking. On a miss,
    /// exactly one login request is issued regardless of how many callers
    /// arrive; all of them receive the same token or the same [`AuthError`].
    pub async fn get_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached_token().await {
            tracing::debug!("token cache hit");
            return Ok(token);
        }
        self.refresh().await
    }

    /// Drop the cached token and acquire a fresh one.
    ///
    /// Used by the client when the backend rejects an unexpired token (401):
    /// local validity says nothing about backend-side revocation.
    pub async fn force_refresh(&self) -> Result<String, AuthError> {
        tracing::info!("forcing token refresh after backend rejection");
        *self.state.cached.write().await = None;
        self.refresh().await
    }

    async fn cached_token(&self) -> Option<String> {
        let guard = self.state.cached.read().await;
        guard
            .as_ref()
            .filter(|cached| cached.is_valid(self.validity))
            .map(|cached| cached.token.clone())
    }

    /// Join the in-flight refresh if one exists, otherwise start one.
    async fn refresh(&self) -> Result<String, AuthError> {
        let refresh = {
            let mut in_flight = self.state.in_flight.lock().await;

            // A refresh may have completed while we waited for the lock.
            if let Some(token) = self.cached_token().await {
                return Ok(token);
            }

            match in_flight.as_ref() {
                Some(refresh) => refresh.clone(),
                None => {
                    let manager = self.clone();
                    let task = tokio::spawn(async move { manager.login_and_store().await });
                    let refresh: RefreshFuture = async move {
                        task.await.unwrap_or_else(|join_error| {
                            Err(AuthError::Transport {
                                message: format!("token refresh task aborted: {join_error}"),
                            })
                        })
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    async fn login_and_store(self) -> Result<String, AuthError> {
        let result = self.login().await;

        match &result {
            Ok(token) => {
                let mut cached = self.state.cached.write().await;
                *cached = Some(CachedToken {
                    token: token.clone(),
                    issued_at: Instant::now(),
                });
                tracing::info!("bearer token refreshed");
            }
            Err(error) => {
                tracing::warn!(%error, "bearer token refresh failed");
            }
        }

        // Clear the marker so the next demander starts a new refresh instead
        // of joining a finished one. Waiters already hold their own clone.
        *self.state.in_flight.lock().await = None;

        result
    }

    /// One login round-trip against `{base_url}/token`.
    async fn login(&self) -> Result<String, AuthError> {
        let url = format!("{}/token", self.config.trimmed_base_url());
        let form = [
            ("grant_type", GRANT_TYPE),
            ("branchcode", self.config.branch_code.as_str()),
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
            ("dbname", self.config.db_name.as_str()),
            ("dbuser", self.config.db_user.as_str()),
            ("dbpassword", self.config.db_password.as_str()),
            ("dbtype", self.config.db_type.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::Transport {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(AuthError::BackendRejected {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: Value =
            serde_json::from_str(&body).map_err(|_| AuthError::MalformedResponse {
                detail: "login response is not valid JSON".to_string(),
            })?;

        match parsed.get("access_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(AuthError::MalformedResponse {
                detail: "access_token field missing or empty".to_string(),
            }),
        }
    }
}
