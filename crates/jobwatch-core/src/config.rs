//! Connection settings for the DeepOrigin Platform API.
//!
//! 環境変数:
//! - `DEEPORIGIN_TOKEN` (必須)
//! - `DEEPORIGIN_ORG_KEY` (必須)
//! - `DEEPORIGIN_BASE_URL` または `DEEPORIGIN_ENV` (`prod` / `staging` / `edge`, 既定は prod)
//! - `DEEPORIGIN_TIMEOUT_SECS` (既定 10)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const TOKEN_VAR: &str = "DEEPORIGIN_TOKEN";
pub const ORG_KEY_VAR: &str = "DEEPORIGIN_ORG_KEY";
pub const BASE_URL_VAR: &str = "DEEPORIGIN_BASE_URL";
pub const ENV_VAR: &str = "DEEPORIGIN_ENV";
pub const TIMEOUT_VAR: &str = "DEEPORIGIN_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("unknown environment '{0}' (expected prod, staging or edge)")]
    UnknownEnvironment(String),

    #[error("invalid timeout '{0}': expected a whole number of seconds")]
    InvalidTimeout(String),
}

/// Deployment the API base URL is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Prod,
    Staging,
    Edge,
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Prod => "https://os.deeporigin.io/api/",
            Environment::Staging => "https://os.staging.deeporigin.io/api/",
            Environment::Edge => "https://os.edge.deeporigin.io/api/",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Environment::Prod),
            "staging" => Ok(Environment::Staging),
            "edge" => Ok(Environment::Edge),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// HTTP client configuration
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Always ends with `/`.
    pub base_url: String,
    pub token: String,
    pub org_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        org_key: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            token: token.into(),
            org_key: org_key.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn for_environment(
        env: Environment,
        token: impl Into<String>,
        org_key: impl Into<String>,
    ) -> Self {
        Self::new(env.base_url(), token, org_key)
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let token = get(TOKEN_VAR).ok_or(ConfigError::Missing(TOKEN_VAR))?;
        let org_key = get(ORG_KEY_VAR).ok_or(ConfigError::Missing(ORG_KEY_VAR))?;
        let base_url = match get(BASE_URL_VAR) {
            Some(url) => url,
            None => get(ENV_VAR)
                .map(|env| env.parse::<Environment>())
                .transpose()?
                .unwrap_or_default()
                .base_url()
                .to_string(),
        };

        let mut config = Self::new(base_url, token, org_key);
        if let Some(raw) = get(TIMEOUT_VAR) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("org_key", &self.org_key)
            .field("timeout", &self.timeout)
            .finish()
    }
}
