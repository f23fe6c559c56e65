//! Core data models for the research orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ToolError;

//
// ================= Access Token =================
//

/// Bearer token issued by the brokerage OAuth endpoint.
///
/// Owned by the credential manager and read-shared across every tool call
/// within one request. A rejected or expired token is replaced wholesale,
/// never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    /// `None` means the remote did not report a usable expiry: assume the
    /// token is valid and rely on server-side rejection.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

//
// ================= Tool Invocation =================
//

/// One remote brokerage call. Created fresh per invocation; immutable once
/// sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Opcode carried in the `api-id` header (e.g. "ka10023").
    pub endpoint_id: String,
    pub parameters: Map<String, Value>,
    pub continuation_token: Option<String>,
    pub continuation_flag: bool,
}

impl ToolRequest {
    pub fn new(endpoint_id: &str, parameters: Map<String, Value>) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            parameters,
            continuation_token: None,
            continuation_flag: false,
        }
    }

    /// Derive the follow-up request for the next page of a cursor chain.
    pub fn with_continuation(&self, next_key: &str) -> Self {
        Self {
            endpoint_id: self.endpoint_id.clone(),
            parameters: self.parameters.clone(),
            continuation_token: Some(next_key.to_string()),
            continuation_flag: true,
        }
    }
}

/// Pagination state reported by a brokerage response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContinuationState {
    pub has_more: bool,
    pub next_key: Option<String>,
}

impl ContinuationState {
    pub fn exhausted() -> Self {
        Self::default()
    }
}

/// Outcome of a single tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult {
    Success {
        payload: Map<String, Value>,
        continuation: ContinuationState,
    },
    Failure {
        error: ToolError,
    },
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }
}

//
// ================= Search =================
//

/// One generated search sub-question.
///
/// Group assignment is deterministic: `index mod 3`, so for N queries the
/// three group sizes differ by at most 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    pub index: usize,
    pub text: String,
}

impl Query {
    pub fn group(&self) -> usize {
        self.index % 3
    }
}

/// A single source attribution returned by the search provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Result of one sub-query, produced by a single search worker.
///
/// A worker that fails wholesale yields one placeholder per assigned query
/// with `error` set and empty sources; the fan-in never aborts on a single
/// group failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: Query,
    pub sources: Vec<Source>,
    pub summary: String,
    pub error: Option<String>,
}

impl SearchResult {
    pub fn failure(query: Query, message: &str) -> Self {
        Self {
            query,
            sources: Vec::new(),
            summary: String::new(),
            error: Some(message.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Merged output of the 3-way fan-out, ordered by original query index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBundle {
    pub results: Vec<SearchResult>,
}

impl ReportBundle {
    pub fn successful(&self) -> impl Iterator<Item = &SearchResult> {
        self.results.iter().filter(|r| !r.is_failure())
    }
}

//
// ================= Report =================
//

/// Classification of a keyword's search-interest direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

/// One-off spike vs sustained interest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendPersistence {
    OneOff,
    Sustained,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Seasonality {
    Seasonal,
    NonSeasonal,
    InsufficientData,
}

/// Trend/statistics section of a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendSummary {
    pub keyword: String,
    pub recent_avg: f64,
    pub yearly_avg: f64,
    pub direction: TrendDirection,
    pub persistence: TrendPersistence,
    pub seasonality: Seasonality,
}

/// Final structured synthesis for one user request. Built once per request;
/// persistence is an external collaborator's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub report_id: Uuid,
    pub question: String,
    pub domain: String,
    pub trend: Option<TrendSummary>,
    pub findings: Vec<ReportSection>,
    pub sources: Vec<Source>,
    pub conclusion: String,
    pub partial_failures: Vec<ErrorPayload>,
    pub created_at: DateTime<Utc>,
}

/// One titled block of report content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub body: Value,
}

//
// ================= Error Payload =================
//

/// Structured failure surfaced to the end caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    pub endpoint: Option<String>,
}

impl ErrorPayload {
    pub fn from_tool_error(endpoint: &str, error: &ToolError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            endpoint: Some(endpoint.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_expiry() {
        let now = Utc::now();
        let token = AccessToken {
            value: "t".to_string(),
            token_type: "Bearer".to_string(),
            issued_at: now,
            expires_at: Some(now + Duration::hours(6)),
        };
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::hours(7)));
    }

    #[test]
    fn unknown_expiry_is_assumed_valid() {
        let now = Utc::now();
        let token = AccessToken {
            value: "t".to_string(),
            token_type: "Bearer".to_string(),
            issued_at: now,
            expires_at: None,
        };
        assert!(!token.is_expired(now + Duration::days(365)));
    }

    #[test]
    fn continuation_request_carries_key() {
        let request = ToolRequest::new("ka10023", Map::new());
        assert!(!request.continuation_flag);

        let next = request.with_continuation("page-2");
        assert!(next.continuation_flag);
        assert_eq!(next.continuation_token.as_deref(), Some("page-2"));
        assert_eq!(next.endpoint_id, "ka10023");
    }

    #[test]
    fn query_group_assignment() {
        for index in 0..12 {
            let query = Query {
                index,
                text: format!("q{index}"),
            };
            assert_eq!(query.group(), index % 3);
        }
    }
}
