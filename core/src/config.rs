//! Service configuration.

use std::time::Duration;

/// Path prefix every endpoint is rooted at.
pub const DEFAULT_API_PREFIX: &str = "/api/v2";

/// Connection settings for `ApiService` and `ReqwestTransport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Origin of the server, e.g. `https://grr.example.com`. A trailing slash
    /// is stripped.
    pub base_url: String,
    pub api_prefix: String,
    /// Per-request timeout applied by `ReqwestTransport`.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("flowgate/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn new(base_url: &str) -> Self {
        Self::default().with_base_url(base_url)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.api_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Origin plus API prefix; every endpoint path is appended to this.
    pub fn api_root(&self) -> String {
        format!("{}{}", self.base_url, self.api_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_stripped() {
        let config = ServiceConfig::new("http://localhost:3000/");
        assert_eq!(config.api_root(), "http://localhost:3000/api/v2");
    }

    #[test]
    fn prefix_is_normalized() {
        let config = ServiceConfig::new("http://h").with_api_prefix("api/v1/");
        assert_eq!(config.api_root(), "http://h/api/v1");
        let config = ServiceConfig::new("http://h").with_api_prefix("");
        assert_eq!(config.api_root(), "http://h");
    }
}
