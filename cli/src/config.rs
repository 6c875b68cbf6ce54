//! `edgeward.toml` loading.
//!
//! ```toml
//! [cloudflare]
//! base_url = "https://api.cloudflare.com/client/v4"
//! timeout_secs = 30
//! max_retries = 3
//! api_token_env = "CLOUDFLARE_API_TOKEN"
//! ```
//!
//! Every key is optional. The token itself never lives in the file, only the
//! name of the environment variable holding it.

use std::path::Path;

use serde::Deserialize;

use edgeward_cloudflare::{
    config::{DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, TOKEN_ENV},
    CloudflareConfig,
};
use edgeward_contracts::error::{EdgewardError, EdgewardResult};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub cloudflare: CloudflareSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudflareSection {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub api_token_env: Option<String>,
}

impl FileConfig {
    pub fn from_toml_str(s: &str) -> EdgewardResult<Self> {
        toml::from_str(s).map_err(|e| EdgewardError::ConfigError {
            reason: format!("failed to parse config: {e}"),
        })
    }

    /// Load `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> EdgewardResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| EdgewardError::ConfigError {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Name of the environment variable holding the API token.
    pub fn token_env(&self) -> &str {
        self.cloudflare.api_token_env.as_deref().unwrap_or(TOKEN_ENV)
    }

    /// Build the client configuration, reading the token with `lookup`.
    pub fn cloudflare(&self, lookup: impl Fn(&str) -> Option<String>) -> EdgewardResult<CloudflareConfig> {
        let token_env = self.token_env();
        let token = lookup(token_env)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| EdgewardError::ConfigError {
                reason: format!("{token_env} environment variable is required"),
            })?;

        let section = &self.cloudflare;
        let mut config = CloudflareConfig::new(section.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL), token)?;
        config.timeout_secs = section.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        config.max_retries = section.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(name: &str) -> Option<String> {
        (name == "EDGE_TOKEN").then(|| "t0ken".to_string())
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = FileConfig::from_toml_str("").unwrap();
        assert_eq!(config.token_env(), TOKEN_ENV);
        assert!(config.cloudflare(|_| None).is_err());

        let cf = config.cloudflare(|_| Some("x".into())).unwrap();
        assert_eq!(cf.base_url.as_str(), "https://api.cloudflare.com/client/v4");
        assert_eq!(cf.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cf.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn section_overrides_defaults() {
        let config = FileConfig::from_toml_str(
            r#"
            [cloudflare]
            base_url = "http://127.0.0.1:8080/client/v4"
            timeout_secs = 5
            max_retries = 0
            api_token_env = "EDGE_TOKEN"
            "#,
        )
        .unwrap();

        let cf = config.cloudflare(token).unwrap();
        assert_eq!(cf.api_token, "t0ken");
        assert_eq!(cf.timeout_secs, 5);
        assert_eq!(cf.max_retries, 0);
        assert_eq!(cf.base_url.host_str(), Some("127.0.0.1"));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let err = FileConfig::from_toml_str("[cloudflare]\ntimeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, EdgewardError::ConfigError { .. }));

        let err = FileConfig::from_toml_str("[cloudflare]\ntoken = \"inline\"").unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn missing_file_is_default() {
        let config = FileConfig::load(Path::new("/nonexistent/edgeward.toml")).unwrap();
        assert!(config.cloudflare.base_url.is_none());
    }
}
