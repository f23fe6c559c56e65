//! HTTP transport to the brokerage API
//!
//! One POST per call, no retries. Transport and parse failures are mapped
//! into `ToolResult::Failure` values at this boundary — nothing below the
//! invoker ever raises past it.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::broker::endpoints::EndpointDescriptor;
use crate::config::BrokerConfig;
use crate::error::ToolError;
use crate::models::{AccessToken, ContinuationState, ToolRequest, ToolResult};
use crate::Result;

/// Header names of the continuation cursor protocol.
const CONT_FLAG_HEADER: &str = "cont-yn";
const CONT_KEY_HEADER: &str = "next-key";

/// A single brokerage round trip. Seam for tests and alternative backends.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn call(
        &self,
        descriptor: &EndpointDescriptor,
        request: &ToolRequest,
        token: Option<&AccessToken>,
    ) -> ToolResult;
}

/// Production transport over a pooled reqwest client.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
        })
    }
}

#[async_trait]
impl BrokerTransport for HttpTransport {
    async fn call(
        &self,
        descriptor: &EndpointDescriptor,
        request: &ToolRequest,
        token: Option<&AccessToken>,
    ) -> ToolResult {
        let url = format!("{}{}", self.base_url, descriptor.path);

        let mut builder = self
            .client
            .post(&url)
            .header("api-id", descriptor.api_id)
            .header("Content-Type", "application/json;charset=UTF-8");

        if let Some(token) = token {
            if !token.value.is_empty() {
                builder = builder.header("authorization", format!("Bearer {}", token.value));
            }
        }

        if request.continuation_flag {
            builder = builder.header(CONT_FLAG_HEADER, "Y");
        }
        if let Some(next_key) = &request.continuation_token {
            builder = builder.header(CONT_KEY_HEADER, next_key.as_str());
        }

        debug!(endpoint = descriptor.api_id, url = %url, "Calling brokerage API");

        let response = match builder.json(&request.parameters).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(endpoint = descriptor.api_id, error = %e, "Brokerage request failed");
                let error = if e.is_timeout() {
                    ToolError::Timeout(format!("{}: {}", descriptor.api_id, e))
                } else {
                    ToolError::TransportFailure(format!("{}: {}", descriptor.api_id, e))
                };
                return ToolResult::Failure { error };
            }
        };

        let status = response.status();
        let continuation = continuation_from_headers(response.headers());

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return ToolResult::Failure {
                    error: ToolError::TransportFailure(format!(
                        "{}: failed to read response body: {}",
                        descriptor.api_id, e
                    )),
                };
            }
        };

        if !status.is_success() {
            return ToolResult::Failure {
                error: ToolError::TransportFailure(format!(
                    "{} returned {}: {}",
                    descriptor.api_id, status, body
                )),
            };
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(payload)) => ToolResult::Success {
                payload,
                continuation,
            },
            Ok(other) => ToolResult::Failure {
                error: ToolError::MalformedResponse(format!(
                    "{}: expected a JSON object, got {}",
                    descriptor.api_id,
                    json_type_name(&other)
                )),
            },
            Err(e) => ToolResult::Failure {
                error: ToolError::MalformedResponse(format!("{}: {}", descriptor.api_id, e)),
            },
        }
    }
}

fn continuation_from_headers(headers: &reqwest::header::HeaderMap) -> ContinuationState {
    let has_more = headers
        .get(CONT_FLAG_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("y"))
        .unwrap_or(false);

    let next_key = headers
        .get(CONT_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string());

    ContinuationState { has_more, next_key }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
