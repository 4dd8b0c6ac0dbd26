//! Gateway credential configuration
//!
//! Loaded once at startup and shared read-only; the token manager builds the
//! login payload from it and never mutates it.

use serde::Deserialize;

use crate::error::ConfigError;

/// Grant type the NetOpenX token endpoint expects. Fixed by the backend.
pub const GRANT_TYPE: &str = "password";

/// Static credentials and connection identifiers for the NetOpenX backend.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the NetOpenX REST service. A trailing slash is tolerated
    /// and stripped before path concatenation.
    pub base_url: String,
    pub branch_code: String,
    pub username: String,
    pub password: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_type: String,
}

impl GatewayConfig {
    /// Load the configuration from `NETOPENX_*` environment variables,
    /// reading a `.env` file first if one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(Self {
            base_url: require_env("NETOPENX_BASE_URL")?,
            branch_code: require_env("NETOPENX_BRANCH_CODE")?,
            username: require_env("NETOPENX_USERNAME")?,
            password: require_env("NETOPENX_PASSWORD")?,
            db_name: require_env("NETOPENX_DB_NAME")?,
            db_user: require_env("NETOPENX_DB_USER")?,
            db_password: require_env("NETOPENX_DB_PASSWORD")?,
            db_type: require_env("NETOPENX_DB_TYPE")?,
        })
    }

    /// Base URL without any trailing slash, ready for path concatenation.
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar {
        name: name.to_string(),
    })
}
