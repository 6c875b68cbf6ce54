//! Cloudflare API client configuration.
//!
//! Defaults point to the public v4 API. Override via environment variables
//! or explicit construction for staging and tests.

use url::Url;

use edgeward_contracts::error::{EdgewardError, EdgewardResult};

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";

/// Configuration for connecting to the Cloudflare API.
///
/// Custom `Debug` implementation redacts the `api_token` field.
#[derive(Clone)]
pub struct CloudflareConfig {
    /// Default: <https://api.cloudflare.com/client/v4>
    pub base_url: Url,
    /// Bearer token with zone ruleset edit permission.
    pub api_token: String,
    pub timeout_secs: u64,
    /// Retries after the first attempt, transport failures only.
    pub max_retries: u32,
}

impl std::fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl CloudflareConfig {
    /// Configuration with default timeout and retries.
    pub fn new(base_url: &str, api_token: impl Into<String>) -> EdgewardResult<Self> {
        Ok(Self {
            base_url: parse_url("base_url", base_url)?,
            api_token: api_token.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `CLOUDFLARE_API_BASE_URL` (default: `https://api.cloudflare.com/client/v4`)
    /// - `CLOUDFLARE_API_TOKEN` (required)
    /// - `CLOUDFLARE_TIMEOUT_SECS` (default: 30)
    /// - `CLOUDFLARE_MAX_RETRIES` (default: 3)
    pub fn from_env() -> EdgewardResult<Self> {
        let api_token = std::env::var(TOKEN_ENV).map_err(|_| EdgewardError::ConfigError {
            reason: format!("{TOKEN_ENV} environment variable is required"),
        })?;
        let base_url =
            std::env::var("CLOUDFLARE_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            base_url: parse_url("CLOUDFLARE_API_BASE_URL", &base_url)?,
            api_token,
            timeout_secs: env_number("CLOUDFLARE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            max_retries: env_number("CLOUDFLARE_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
        })
    }

    /// `base_url` without a trailing slash, ready for path concatenation.
    pub(crate) fn api_root(&self) -> String {
        self.base_url.as_str().trim_end_matches('/').to_string()
    }
}

pub(crate) fn parse_url(name: &str, raw: &str) -> EdgewardResult<Url> {
    Url::parse(raw).map_err(|e| EdgewardError::ConfigError {
        reason: format!("invalid URL for {name}: {e}"),
    })
}

fn env_number<T: std::str::FromStr>(var: &str, default: T) -> EdgewardResult<T> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse().map_err(|_| EdgewardError::ConfigError {
            reason: format!("{var} must be a non-negative integer, got '{raw}'"),
        }),
    }
}
