//! Generic tool invoker and the continuation cursor protocol
//!
//! One invoker serves every registered endpoint: it validates parameters
//! against the endpoint descriptor, injects the bearer token and the
//! continuation cursor, performs exactly one transport call, and applies
//! the client-side row cap where the remote lacks native limiting.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::broker::endpoints::{endpoint, EndpointDescriptor};
use crate::broker::transport::BrokerTransport;
use crate::error::{OrchestrationError, ToolError};
use crate::models::{AccessToken, ContinuationState, ToolRequest, ToolResult};
use crate::Result;

/// Client-side cap on unlimited row arrays. Bounds both the response size
/// and the downstream report context.
pub const ROW_CAP: usize = 10;

/// Upper bound on cursor-chain length, guarding against a remote that
/// always claims more data exists.
pub const MAX_CONTINUATION_PAGES: usize = 50;

pub struct ToolInvoker {
    transport: Arc<dyn BrokerTransport>,
}

impl ToolInvoker {
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        Self { transport }
    }

    /// Perform a single call against one endpoint. Remote failures come back
    /// as `ToolResult::Failure`; only an unregistered opcode is an error at
    /// this level.
    pub async fn invoke(
        &self,
        endpoint_id: &str,
        parameters: Map<String, Value>,
        token: Option<&AccessToken>,
        continuation: Option<&ContinuationState>,
    ) -> Result<ToolResult> {
        let descriptor = endpoint(endpoint_id)
            .ok_or_else(|| OrchestrationError::UnknownEndpoint(endpoint_id.to_string()))?;

        if let Some(missing) = first_missing_parameter(descriptor, &parameters) {
            return Ok(ToolResult::Failure {
                error: ToolError::MissingParameter(format!("{endpoint_id}: {missing}")),
            });
        }

        let mut request = ToolRequest::new(endpoint_id, parameters);
        if let Some(state) = continuation {
            if let Some(next_key) = &state.next_key {
                request = request.with_continuation(next_key);
            }
        }

        let result = self.transport.call(descriptor, &request, token).await;

        Ok(match result {
            ToolResult::Success {
                mut payload,
                continuation,
            } => {
                apply_row_cap(descriptor, &mut payload);
                ToolResult::Success {
                    payload,
                    continuation,
                }
            }
            failure => failure,
        })
    }

    /// Fetch the full result set for one endpoint under the continuation
    /// protocol: pages are requested strictly sequentially, each carrying
    /// the previous page's `next-key`, and their row arrays are concatenated
    /// in arrival order. Page boundaries are assumed disjoint by the remote
    /// contract; duplicates are accepted as-is.
    pub async fn invoke_all_pages(
        &self,
        endpoint_id: &str,
        parameters: Map<String, Value>,
        token: Option<&AccessToken>,
    ) -> Result<ToolResult> {
        let descriptor = endpoint(endpoint_id)
            .ok_or_else(|| OrchestrationError::UnknownEndpoint(endpoint_id.to_string()))?;

        let mut merged: Option<Map<String, Value>> = None;
        let mut state = ContinuationState::exhausted();

        for page in 1..=MAX_CONTINUATION_PAGES {
            let continuation = if page == 1 { None } else { Some(&state) };
            let result = self
                .invoke(endpoint_id, parameters.clone(), token, continuation)
                .await?;

            let (payload, continuation) = match result {
                ToolResult::Success {
                    payload,
                    continuation,
                } => (payload, continuation),
                failure => return Ok(failure),
            };

            debug!(
                endpoint = endpoint_id,
                page,
                has_more = continuation.has_more,
                "Fetched page"
            );

            merged = Some(match merged.take() {
                None => payload,
                Some(mut acc) => {
                    append_rows(descriptor, &mut acc, payload);
                    acc
                }
            });

            if !continuation.has_more || continuation.next_key.is_none() {
                state = ContinuationState::exhausted();
                break;
            }

            if page == MAX_CONTINUATION_PAGES {
                warn!(
                    endpoint = endpoint_id,
                    pages = MAX_CONTINUATION_PAGES,
                    "Continuation bound reached; returning partial result set"
                );
            }
            state = continuation;
        }

        Ok(ToolResult::Success {
            payload: merged.unwrap_or_default(),
            continuation: ContinuationState::exhausted(),
        })
    }
}

fn first_missing_parameter(
    descriptor: &EndpointDescriptor,
    parameters: &Map<String, Value>,
) -> Option<&'static str> {
    descriptor
        .required
        .iter()
        .find(|name| !parameters.contains_key(**name))
        .copied()
}

/// Truncate the endpoint's unlimited row array to the first `ROW_CAP`
/// entries, annotating the payload so callers can see truncation occurred.
/// `total_count` reports the truncated length, matching the upstream
/// system byte-for-byte (see DESIGN.md: latent-bug preservation).
fn apply_row_cap(descriptor: &EndpointDescriptor, payload: &mut Map<String, Value>) {
    if !descriptor.cap_rows {
        return;
    }
    let Some(field) = descriptor.rows_field else {
        return;
    };
    let Some(Value::Array(rows)) = payload.get_mut(field) else {
        return;
    };

    rows.truncate(ROW_CAP);
    let truncated_len = rows.len();

    payload.insert("limited_to".to_string(), Value::from(ROW_CAP));
    payload.insert("total_count".to_string(), Value::from(truncated_len));
}

/// Concatenate a follow-up page's rows onto the merged payload, preserving
/// arrival order. Scalar fields keep their first-page values.
fn append_rows(
    descriptor: &EndpointDescriptor,
    merged: &mut Map<String, Value>,
    mut page: Map<String, Value>,
) {
    let Some(field) = descriptor.rows_field else {
        return;
    };
    let Some(Value::Array(new_rows)) = page.remove(field) else {
        return;
    };

    match merged.get_mut(field) {
        Some(Value::Array(rows)) => rows.extend(new_rows),
        _ => {
            merged.insert(field.to_string(), Value::Array(new_rows));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Scripted transport: pops pre-canned results and records every
    /// request it sees.
    struct FakeTransport {
        script: Mutex<Vec<ToolResult>>,
        seen: Mutex<Vec<ToolRequest>>,
    }

    impl FakeTransport {
        fn new(mut pages: Vec<ToolResult>) -> Self {
            pages.reverse();
            Self {
                script: Mutex::new(pages),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<ToolRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrokerTransport for FakeTransport {
        async fn call(
            &self,
            _descriptor: &EndpointDescriptor,
            request: &ToolRequest,
            _token: Option<&AccessToken>,
        ) -> ToolResult {
            self.seen.lock().unwrap().push(request.clone());
            self.script.lock().unwrap().pop().unwrap_or_else(|| {
                // Script exhausted: report an exhausted empty page.
                ToolResult::Success {
                    payload: Map::new(),
                    continuation: ContinuationState::exhausted(),
                }
            })
        }
    }

    fn page(rows: Vec<Value>, has_more: bool, next_key: Option<&str>) -> ToolResult {
        let mut payload = Map::new();
        payload.insert("trde_qty_sdnin".to_string(), Value::Array(rows));
        ToolResult::Success {
            payload,
            continuation: ContinuationState {
                has_more,
                next_key: next_key.map(|k| k.to_string()),
            },
        }
    }

    fn surge_params() -> Map<String, Value> {
        let value = json!({
            "mrkt_tp": "000",
            "sort_tp": "1",
            "tm_tp": "2",
            "trde_qty_tp": "5",
            "stk_cnd": "0",
            "pric_tp": "0",
            "stex_tp": "3",
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn rows(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"stk_cd": format!("{i:06}")})).collect()
    }

    #[tokio::test]
    async fn missing_required_parameter_fails_without_a_call() {
        let transport = Arc::new(FakeTransport::new(vec![]));
        let invoker = ToolInvoker::new(transport.clone());

        let result = invoker
            .invoke("ka10023", Map::new(), None, None)
            .await
            .expect("known endpoint");

        match result {
            ToolResult::Failure { error } => {
                assert!(matches!(error, ToolError::MissingParameter(_)));
            }
            _ => panic!("expected failure"),
        }
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_endpoint_is_an_error() {
        let invoker = ToolInvoker::new(Arc::new(FakeTransport::new(vec![])));
        let err = invoker
            .invoke("zz99999", Map::new(), None, None)
            .await
            .expect_err("unregistered opcode");
        assert!(matches!(err, OrchestrationError::UnknownEndpoint(_)));
    }

    #[tokio::test]
    async fn unlimited_array_is_capped_with_metadata() {
        let transport = Arc::new(FakeTransport::new(vec![page(rows(37), false, None)]));
        let invoker = ToolInvoker::new(transport);

        let result = invoker
            .invoke("ka10023", surge_params(), None, None)
            .await
            .expect("ok");

        match result {
            ToolResult::Success { payload, .. } => {
                let capped = payload["trde_qty_sdnin"].as_array().expect("array");
                assert_eq!(capped.len(), 10);
                assert_eq!(payload["limited_to"], json!(10));
                // total_count reports the truncated slice length.
                assert_eq!(payload["total_count"], json!(10));
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn exhausted_first_page_terminates_in_one_call() {
        let transport = Arc::new(FakeTransport::new(vec![page(rows(3), false, None)]));
        let invoker = ToolInvoker::new(transport.clone());

        let result = invoker
            .invoke_all_pages("ka10023", surge_params(), None)
            .await
            .expect("ok");

        assert!(result.is_success());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn next_key_is_carried_into_exactly_one_more_call() {
        let transport = Arc::new(FakeTransport::new(vec![
            page(rows(3), true, Some("page-2")),
            page(rows(2), false, None),
        ]));
        let invoker = ToolInvoker::new(transport.clone());

        let result = invoker
            .invoke_all_pages("ka10023", surge_params(), None)
            .await
            .expect("ok");

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].continuation_flag);
        assert!(requests[1].continuation_flag);
        assert_eq!(requests[1].continuation_token.as_deref(), Some("page-2"));

        // Pages concatenated in arrival order: 3 rows then 2.
        match result {
            ToolResult::Success { payload, .. } => {
                assert_eq!(payload["trde_qty_sdnin"].as_array().unwrap().len(), 5);
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn misbehaving_remote_is_bounded() {
        // Every page claims more data exists; the chain must stop at the
        // configured bound.
        let pages: Vec<ToolResult> = (0..100)
            .map(|i| page(rows(1), true, Some(&format!("k{i}"))))
            .collect();
        let transport = Arc::new(FakeTransport::new(pages));
        let invoker = ToolInvoker::new(transport.clone());

        let result = invoker
            .invoke_all_pages("ka10023", surge_params(), None)
            .await
            .expect("ok");

        assert!(result.is_success());
        assert_eq!(transport.requests().len(), MAX_CONTINUATION_PAGES);
    }

    #[tokio::test]
    async fn mid_chain_failure_is_returned_as_value() {
        let transport = Arc::new(FakeTransport::new(vec![
            page(rows(3), true, Some("page-2")),
            ToolResult::Failure {
                error: ToolError::TransportFailure("boom".to_string()),
            },
        ]));
        let invoker = ToolInvoker::new(transport);

        let result = invoker
            .invoke_all_pages("ka10023", surge_params(), None)
            .await
            .expect("ok");

        assert!(!result.is_success());
    }
}
