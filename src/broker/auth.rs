//! Credential manager for the brokerage OAuth endpoint
//!
//! Stateless between invocations: every user request acquires a fresh token
//! and discards it at request end. `refresh_token` exists for callers that
//! detect a rejected or expired token mid-flow; the replacement is a new
//! value, never an in-place update.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::broker::endpoints::{AUTH_API_ID, AUTH_PATH};
use crate::config::BrokerConfig;
use crate::error::AuthError;
use crate::models::AccessToken;
use crate::Result;

/// Seconds east of UTC for the exchange's local clock, used to interpret
/// the `expires_dt` wall-time the remote reports.
const EXCHANGE_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Token lifecycle seam for the coordinator.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire(&self) -> std::result::Result<AccessToken, AuthError>;
    async fn refresh(&self, current: &AccessToken)
        -> std::result::Result<AccessToken, AuthError>;
}

pub struct CredentialManager {
    client: Client,
    base_url: String,
    app_key: String,
    secret_key: String,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    appkey: &'a str,
    secretkey: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    token_type: Option<String>,
    expires_dt: Option<String>,
    return_code: Option<i64>,
    return_msg: Option<String>,
}

impl CredentialManager {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            app_key: config.app_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// Issue a new access token. No internal retry — retry policy belongs to
    /// the coordinator.
    pub async fn acquire_token(&self) -> std::result::Result<AccessToken, AuthError> {
        self.request_token(None).await
    }

    /// Exchange a current token for a replacement, for callers that hit a
    /// rejection mid-flow.
    pub async fn refresh_token(
        &self,
        current: &AccessToken,
    ) -> std::result::Result<AccessToken, AuthError> {
        if current.value.is_empty() {
            return Err(AuthError::MissingCredentials(
                "no current token to refresh".to_string(),
            ));
        }
        self.request_token(Some(&current.value)).await
    }

    async fn request_token(
        &self,
        bearer: Option<&str>,
    ) -> std::result::Result<AccessToken, AuthError> {
        if self.app_key.is_empty() || self.secret_key.is_empty() {
            return Err(AuthError::MissingCredentials(
                "application key and secret key must both be configured".to_string(),
            ));
        }

        let url = format!("{}{}", self.base_url, AUTH_PATH);
        let body = TokenRequest {
            grant_type: "client_credentials",
            appkey: &self.app_key,
            secretkey: &self.secret_key,
        };

        let mut builder = self
            .client
            .post(&url)
            .header("api-id", AUTH_API_ID)
            .header("Content-Type", "application/json;charset=UTF-8");

        if let Some(bearer) = bearer {
            builder = builder.header("authorization", format!("Bearer {bearer}"));
        }

        debug!(url = %url, "Requesting brokerage access token");

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::TransportFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::TransportFailure(format!(
                "token endpoint returned {status}: {text}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::RemoteRejected(format!("unreadable token payload: {e}")))?;

        if let Some(code) = parsed.return_code {
            if code != 0 {
                return Err(AuthError::RemoteRejected(format!(
                    "return_code {}: {}",
                    code,
                    parsed.return_msg.unwrap_or_default()
                )));
            }
        }

        let value = parsed
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::RemoteRejected("response carried no token".to_string()))?;

        let issued_at = Utc::now();
        let expires_at = parsed
            .expires_dt
            .as_deref()
            .and_then(parse_expiry);

        if parsed.expires_dt.is_some() && expires_at.is_none() {
            warn!("Unparseable token expiry; assuming valid until rejected");
        }

        info!(expires_at = ?expires_at, "Access token issued");

        Ok(AccessToken {
            value,
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            issued_at,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenSource for CredentialManager {
    async fn acquire(&self) -> std::result::Result<AccessToken, AuthError> {
        self.acquire_token().await
    }

    async fn refresh(
        &self,
        current: &AccessToken,
    ) -> std::result::Result<AccessToken, AuthError> {
        self.refresh_token(current).await
    }
}

/// Parse the remote's `YYYYMMDDHHMMSS` wall-time expiry, reported in the
/// exchange's local zone. Anything unparseable yields `None`.
fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S").ok()?;
    let offset = FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS)?;
    naive
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REQUEST_TIMEOUT;

    fn config_with(app_key: &str, secret_key: &str) -> BrokerConfig {
        BrokerConfig {
            app_key: app_key.to_string(),
            secret_key: secret_key.to_string(),
            use_mock: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[tokio::test]
    async fn missing_credentials_short_circuit_before_network() {
        // Base URL resolves to the mock host; with empty keys the manager
        // must fail before any request is attempted.
        let manager = CredentialManager::new(&config_with("", "")).expect("client");
        let err = manager.acquire_token().await.expect_err("must fail");
        assert!(matches!(err, AuthError::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn one_empty_key_is_still_missing() {
        let manager = CredentialManager::new(&config_with("app", "")).expect("client");
        let err = manager.acquire_token().await.expect_err("must fail");
        assert!(matches!(err, AuthError::MissingCredentials(_)));
    }

    #[tokio::test]
    async fn refresh_requires_a_current_token() {
        let manager = CredentialManager::new(&config_with("app", "secret")).expect("client");
        let empty = AccessToken {
            value: String::new(),
            token_type: "Bearer".to_string(),
            issued_at: Utc::now(),
            expires_at: None,
        };
        let err = manager.refresh_token(&empty).await.expect_err("must fail");
        assert!(matches!(err, AuthError::MissingCredentials(_)));
    }

    #[test]
    fn expiry_parsing() {
        let parsed = parse_expiry("20251231235959").expect("parses");
        // 23:59:59 at UTC+9 is 14:59:59 UTC.
        assert_eq!(parsed.to_rfc3339(), "2025-12-31T14:59:59+00:00");

        assert!(parse_expiry("not-a-date").is_none());
        assert!(parse_expiry("").is_none());
    }
}
