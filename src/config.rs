//! Application configuration
//!
//! Built once at startup (the binaries load `.env` and call `from_env`),
//! then passed by reference into every component. Call logic never reads
//! the process environment.

use std::env;
use std::time::Duration;

use crate::error::OrchestrationError;
use crate::Result;

/// Live brokerage host.
pub const BROKER_LIVE_URL: &str = "https://api.kiwoom.com";
/// Paper-trading (mock) brokerage host.
pub const BROKER_MOCK_URL: &str = "https://mockapi.kiwoom.com";

/// Default per-request timeout, matching the external tool-connection
/// timeout. Timeouts surface as `ToolError::Timeout`, never as a panic.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Brokerage API configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub app_key: String,
    pub secret_key: String,
    /// Paper-trading flag; selects the mock host when set.
    pub use_mock: bool,
    pub request_timeout: Duration,
}

impl BrokerConfig {
    pub fn base_url(&self) -> &'static str {
        if self.use_mock {
            BROKER_MOCK_URL
        } else {
            BROKER_LIVE_URL
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.app_key.is_empty() && !self.secret_key.is_empty()
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    /// Key for the search-grounding LLM backend. Empty disables live search.
    pub gemini_api_key: String,
    /// Base URL of the trend statistics service, if deployed.
    pub trends_base_url: Option<String>,
}

impl AppConfig {
    /// Read configuration from the environment. Intended to be called once
    /// from a binary's `main`; missing brokerage secrets are a startup-fatal
    /// condition there, while unit tests construct configs directly.
    pub fn from_env() -> Result<Self> {
        let app_key = env::var("BROKER_APP_KEY").unwrap_or_default();
        let secret_key = env::var("BROKER_SECRET_KEY").unwrap_or_default();
        let use_mock = env::var("BROKER_USE_MOCK")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let config = Self {
            broker: BrokerConfig {
                app_key,
                secret_key,
                use_mock,
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            trends_base_url: env::var("TRENDS_API_BASE_URL")
                .ok()
                .map(|v| v.trim_end_matches('/').to_string()),
        };

        Ok(config)
    }

    /// Startup validation for the binaries: brokerage secrets must be
    /// present before serving any traffic.
    pub fn require_broker_credentials(&self) -> Result<()> {
        if self.broker.has_credentials() {
            Ok(())
        } else {
            Err(OrchestrationError::ConfigError(
                "BROKER_APP_KEY and BROKER_SECRET_KEY must be set".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_broker_config() -> BrokerConfig {
        BrokerConfig {
            app_key: "test-app-key".to_string(),
            secret_key: "test-secret-key".to_string(),
            use_mock: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[test]
    fn mock_flag_selects_host() {
        let mut config = test_broker_config();
        assert_eq!(config.base_url(), BROKER_MOCK_URL);

        config.use_mock = false;
        assert_eq!(config.base_url(), BROKER_LIVE_URL);
    }

    #[test]
    fn missing_secrets_fail_startup_validation() {
        let config = AppConfig {
            broker: BrokerConfig {
                app_key: String::new(),
                secret_key: "s".to_string(),
                use_mock: true,
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            gemini_api_key: String::new(),
            trends_base_url: None,
        };

        assert!(config.require_broker_credentials().is_err());
    }
}
