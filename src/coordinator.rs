//! Coordinator — runs the full research flow
//!
//! token acquisition → intent routing → tool invocation under the
//! continuation protocol (brokerage domains) or parallel search fan-out
//! (discovery) → normalization → report assembly.
//!
//! Per-request failures are absorbed where the spec of the surrounding
//! stage allows it; only a failed token acquisition aborts a brokerage
//! flow outright.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::auth::TokenSource;
use crate::broker::invoker::ToolInvoker;
use crate::error::OrchestrationError;
use crate::models::{
    AccessToken, ErrorPayload, Report, ReportBundle, ReportSection, Source, ToolResult,
};
use crate::normalizer::normalize;
use crate::router::{extract_stock_code, IntentRouter, ToolSetId};
use crate::search::SearchPipeline;
use crate::trends::TrendAnalyzer;
use crate::Result;

pub struct Coordinator {
    tokens: Arc<dyn TokenSource>,
    invoker: ToolInvoker,
    search: SearchPipeline,
    trends: Option<TrendAnalyzer>,
}

impl Coordinator {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        invoker: ToolInvoker,
        search: SearchPipeline,
        trends: Option<TrendAnalyzer>,
    ) -> Self {
        Self {
            tokens,
            invoker,
            search,
            trends,
        }
    }

    /// Wire the live components from configuration.
    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        use crate::broker::{CredentialManager, HttpTransport};
        use crate::gemini::GeminiClient;
        use crate::trends::TrendApiClient;

        let credentials = CredentialManager::new(&config.broker)?;
        let transport = HttpTransport::new(&config.broker)?;
        let gemini = Arc::new(GeminiClient::new(config.gemini_api_key.clone())?);
        let trends = match &config.trends_base_url {
            Some(url) => Some(TrendAnalyzer::new(Arc::new(TrendApiClient::new(url)?))),
            None => None,
        };

        Ok(Self::new(
            Arc::new(credentials),
            ToolInvoker::new(Arc::new(transport)),
            SearchPipeline::grounded(gemini),
            trends,
        ))
    }

    /// Handle one research request end to end.
    pub async fn run(&self, request: &str) -> Result<Report> {
        let domain = IntentRouter::route(request);
        info!(domain = domain.as_str(), request, "Coordinator: request routed");

        match domain {
            ToolSetId::Discovery => self.run_discovery(request).await,
            brokerage => self.run_brokerage(request, brokerage).await,
        }
    }

    /// Structured error payload for the end caller.
    pub fn error_payload(error: &OrchestrationError) -> ErrorPayload {
        match error {
            OrchestrationError::Auth(e) => ErrorPayload {
                kind: "authentication_failed".to_string(),
                message: e.to_string(),
                endpoint: Some("au10001".to_string()),
            },
            OrchestrationError::Tool(e) => ErrorPayload {
                kind: e.kind().to_string(),
                message: e.to_string(),
                endpoint: None,
            },
            other => ErrorPayload {
                kind: "orchestration_error".to_string(),
                message: other.to_string(),
                endpoint: None,
            },
        }
    }

    // =============================
    // Brokerage path
    // =============================

    async fn run_brokerage(&self, request: &str, domain: ToolSetId) -> Result<Report> {
        // A failed acquisition aborts the whole brokerage flow; calls are
        // never attempted with an empty token.
        let mut token = self.tokens.acquire().await.map_err(OrchestrationError::Auth)?;

        let stock_code = extract_stock_code(request);
        let today = Utc::now().date_naive();

        let mut findings = Vec::new();
        let mut partial_failures = Vec::new();

        for endpoint_id in domain.endpoints() {
            token = self.ensure_fresh(token).await?;

            let parameters = default_parameters(endpoint_id, stock_code.as_deref(), today);
            let result = self
                .invoker
                .invoke_all_pages(endpoint_id, parameters, Some(&token))
                .await?;

            match result {
                ToolResult::Success { payload, .. } => match normalize(endpoint_id, &payload) {
                    Ok(record) => {
                        debug!(endpoint = endpoint_id, "Normalized payload");
                        findings.push(ReportSection {
                            title: record.operation.clone(),
                            body: serde_json::to_value(&record)?,
                        });
                    }
                    Err(e) => {
                        warn!(endpoint = endpoint_id, error = %e, "Normalization failed");
                        partial_failures.push(ErrorPayload::from_tool_error(endpoint_id, &e));
                    }
                },
                ToolResult::Failure { error } => {
                    warn!(endpoint = endpoint_id, error = %error, "Tool call failed");
                    partial_failures.push(ErrorPayload::from_tool_error(endpoint_id, &error));
                }
            }
        }

        let conclusion = brokerage_conclusion(domain, findings.len(), &partial_failures);

        Ok(Report {
            report_id: Uuid::new_v4(),
            question: request.to_string(),
            domain: domain.as_str().to_string(),
            trend: None,
            findings,
            sources: Vec::new(),
            conclusion,
            partial_failures,
            created_at: Utc::now(),
        })
    }

    /// Replace the token when its reported expiry has passed. The old value
    /// is dropped, not mutated, so concurrent readers never see a
    /// half-updated token.
    async fn ensure_fresh(&self, token: AccessToken) -> Result<AccessToken> {
        if !token.is_expired(Utc::now()) {
            return Ok(token);
        }
        info!("Access token expired mid-flow; refreshing");
        self.tokens
            .refresh(&token)
            .await
            .map_err(OrchestrationError::Auth)
    }

    // =============================
    // Discovery path
    // =============================

    async fn run_discovery(&self, request: &str) -> Result<Report> {
        let bundle = self.search.run(request).await?;

        let mut partial_failures = Vec::new();

        let trend = match &self.trends {
            Some(analyzer) => match analyzer.summarize(request).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    // Missing trend data degrades the report, it does not
                    // fail the request.
                    warn!(error = %e, "Trend summary unavailable");
                    partial_failures.push(ErrorPayload {
                        kind: "trend_unavailable".to_string(),
                        message: e.to_string(),
                        endpoint: None,
                    });
                    None
                }
            },
            None => None,
        };

        for result in &bundle.results {
            if let Some(error) = &result.error {
                partial_failures.push(ErrorPayload {
                    kind: "search_failure".to_string(),
                    message: error.clone(),
                    endpoint: None,
                });
            }
        }

        let findings = bundle
            .results
            .iter()
            .map(|result| ReportSection {
                title: result.query.text.clone(),
                body: serde_json::json!({
                    "summary": result.summary,
                    "failed": result.is_failure(),
                }),
            })
            .collect();

        let sources = collect_sources(&bundle);
        let conclusion = discovery_conclusion(&bundle, trend.is_some());

        Ok(Report {
            report_id: Uuid::new_v4(),
            question: request.to_string(),
            domain: ToolSetId::Discovery.as_str().to_string(),
            trend,
            findings,
            sources,
            conclusion,
            partial_failures,
            created_at: Utc::now(),
        })
    }
}

/// Aggregate source attributions across all queries, keeping first
/// occurrence order and dropping duplicate URLs.
fn collect_sources(bundle: &ReportBundle) -> Vec<Source> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();
    for result in bundle.successful() {
        for source in &result.sources {
            if seen.insert(source.url.clone()) {
                sources.push(source.clone());
            }
        }
    }
    sources
}

fn brokerage_conclusion(
    domain: ToolSetId,
    succeeded: usize,
    failures: &[ErrorPayload],
) -> String {
    let total = domain.endpoints().len();
    if failures.is_empty() {
        format!(
            "All {total} {} operations returned data; see findings for details.",
            domain.as_str()
        )
    } else {
        format!(
            "{succeeded} of {total} {} operations returned data; {} failed and are listed under partial failures.",
            domain.as_str(),
            failures.len()
        )
    }
}

fn discovery_conclusion(bundle: &ReportBundle, has_trend: bool) -> String {
    let total = bundle.results.len();
    let failed = bundle.results.iter().filter(|r| r.is_failure()).count();
    let mut conclusion = if failed == 0 {
        format!("Synthesized findings from {total} research queries.")
    } else {
        format!(
            "Synthesized findings from {} of {total} research queries; {failed} queries failed.",
            total - failed
        )
    };
    if has_trend {
        conclusion.push_str(" Search-interest trend statistics are included.");
    }
    conclusion
}

// =============================
// Default parameters
// =============================

/// Baseline parameter set per opcode: whole-market scope, unified exchange,
/// permissive filters. A stock code extracted from the request (or supplied
/// by the API caller) fills the per-stock operations; operations whose
/// required inputs stay unfilled fail as `MissingParameter` and surface as
/// partial failures rather than aborting the flow.
pub fn default_parameters(
    endpoint_id: &str,
    stock_code: Option<&str>,
    today: NaiveDate,
) -> Map<String, Value> {
    let mut p = Map::new();
    let mut set = |key: &str, value: &str| {
        p.insert(key.to_string(), Value::String(value.to_string()));
    };

    let date = |d: NaiveDate| d.format("%Y%m%d").to_string();
    let month_ago = today - Duration::days(30);
    let week_ago = today - Duration::days(7);

    match endpoint_id {
        // account
        "kt00004" => {
            set("qry_tp", "0");
            set("dmst_stex_tp", "KRX");
        }
        // single stock
        "ka10001" => {}
        "ka10081" => {
            set("base_dt", &date(today));
            set("upd_stkpc_tp", "1");
        }
        "ka10080" => {
            set("tic_scope", "5");
            set("upd_stkpc_tp", "1");
        }
        "ka10045" => {
            set("strt_dt", &date(month_ago));
            set("end_dt", &date(today));
            set("orgn_prsm_unp_tp", "1");
            set("for_prsm_unp_tp", "1");
        }
        "ka10014" => {
            set("tm_tp", "1");
            set("strt_dt", &date(month_ago));
            set("end_dt", &date(today));
        }
        "ka90013" => {
            set("amt_qty_tp", "1");
        }
        // ranking
        "ka10023" => {
            set("mrkt_tp", "000");
            set("sort_tp", "2");
            set("tm_tp", "2");
            set("trde_qty_tp", "5");
            set("stk_cnd", "0");
            set("pric_tp", "0");
            set("stex_tp", "3");
        }
        "ka10030" => {
            set("mrkt_tp", "000");
            set("sort_tp", "1");
            set("mang_stk_incls", "1");
            set("crd_tp", "0");
            set("trde_qty_tp", "0");
            set("pric_tp", "0");
            set("trde_prica_tp", "0");
            set("mrkt_open_tp", "0");
            set("stex_tp", "3");
        }
        "ka10032" => {
            set("mrkt_tp", "000");
            set("mang_stk_incls", "1");
            set("stex_tp", "3");
        }
        "ka10027" => {
            set("mrkt_tp", "000");
            set("sort_tp", "1");
            set("trde_qty_cnd", "0000");
            set("stk_cnd", "0");
            set("crd_cnd", "0");
            set("updown_incls", "1");
            set("pric_cnd", "0");
            set("trde_prica_cnd", "0");
            set("stex_tp", "3");
        }
        "ka10029" => {
            set("mrkt_tp", "000");
            set("sort_tp", "1");
            set("trde_qty_cnd", "0");
            set("stk_cnd", "0");
            set("crd_cnd", "0");
            set("pric_cnd", "0");
            set("stex_tp", "3");
        }
        // sector / theme
        "ka10101" => {
            set("mrkt_tp", "0");
        }
        "ka20001" | "ka20002" => {
            set("mrkt_tp", "0");
            set("inds_cd", "001");
            if endpoint_id == "ka20002" {
                set("stex_tp", "3");
            }
        }
        "ka20003" => {
            set("inds_cd", "001");
        }
        "ka90001" => {
            set("qry_tp", "0");
            set("date_tp", "10");
            set("flu_pl_amt_tp", "1");
            set("stex_tp", "3");
        }
        "ka90002" => {
            set("thema_grp_cd", "100");
            set("stex_tp", "3");
            set("date_tp", "10");
        }
        // supply / demand
        "ka10131" => {
            set("dt", "1");
            set("mrkt_tp", "001");
            set("netslmt_tp", "2");
            set("stk_inds_tp", "0");
            set("amt_qty_tp", "0");
            set("stex_tp", "3");
        }
        "ka90009" => {
            set("mrkt_tp", "000");
            set("amt_qty_tp", "1");
            set("qry_dt_tp", "0");
            set("stex_tp", "3");
        }
        "ka10035" => {
            set("mrkt_tp", "000");
            set("trde_tp", "2");
            set("base_dt_tp", "1");
            set("stex_tp", "3");
        }
        "ka10044" => {
            set("strt_dt", &date(week_ago));
            set("end_dt", &date(today));
            set("trde_tp", "1");
            set("mrkt_tp", "001");
            set("stex_tp", "3");
        }
        "ka10065" => {
            set("trde_tp", "1");
            set("mrkt_tp", "000");
            set("orgn_tp", "9000");
        }
        _ => {}
    }

    if let Some(code) = stock_code {
        // Only the per-stock operations take a code.
        if matches!(
            endpoint_id,
            "ka10001" | "ka10081" | "ka10080" | "ka10045" | "ka10014" | "ka90013"
        ) {
            set("stk_cd", code);
        }
    }

    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::endpoints::EndpointDescriptor;
    use crate::broker::transport::BrokerTransport;
    use crate::error::{AuthError, ToolError};
    use crate::models::{ContinuationState, Query, SearchResult, ToolRequest};
    use crate::search::{QueryGenerator, SearchWorker, GROUP_COUNT};
    use crate::trends::{TrendProvider, TrendWindow};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    //
    // ---- fakes ----
    //

    struct FakeTokens {
        expired: bool,
        fail: bool,
        refreshes: AtomicUsize,
    }

    impl FakeTokens {
        fn ok() -> Self {
            Self {
                expired: false,
                fail: false,
                refreshes: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                expired: false,
                refreshes: AtomicUsize::new(0),
            }
        }

        fn expired() -> Self {
            Self {
                expired: true,
                fail: false,
                refreshes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenSource for FakeTokens {
        async fn acquire(&self) -> std::result::Result<AccessToken, AuthError> {
            if self.fail {
                return Err(AuthError::MissingCredentials("no keys".to_string()));
            }
            let now = Utc::now();
            Ok(AccessToken {
                value: "initial".to_string(),
                token_type: "Bearer".to_string(),
                issued_at: now,
                expires_at: if self.expired {
                    Some(now - Duration::hours(1))
                } else {
                    None
                },
            })
        }

        async fn refresh(
            &self,
            _current: &AccessToken,
        ) -> std::result::Result<AccessToken, AuthError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken {
                value: "fresh".to_string(),
                token_type: "Bearer".to_string(),
                issued_at: Utc::now(),
                expires_at: None,
            })
        }
    }

    /// Transport answering every endpoint with a minimal valid payload,
    /// optionally failing a chosen opcode.
    struct CannedTransport {
        fail_endpoint: Option<&'static str>,
        tokens_seen: Mutex<Vec<String>>,
    }

    impl CannedTransport {
        fn new() -> Self {
            Self {
                fail_endpoint: None,
                tokens_seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(endpoint: &'static str) -> Self {
            Self {
                fail_endpoint: Some(endpoint),
                tokens_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BrokerTransport for CannedTransport {
        async fn call(
            &self,
            descriptor: &EndpointDescriptor,
            _request: &ToolRequest,
            token: Option<&AccessToken>,
        ) -> ToolResult {
            if let Some(token) = token {
                self.tokens_seen.lock().unwrap().push(token.value.clone());
            }

            if self.fail_endpoint == Some(descriptor.api_id) {
                return ToolResult::Failure {
                    error: ToolError::TransportFailure("connection refused".to_string()),
                };
            }

            let mut payload = Map::new();
            if let Some(field) = descriptor.rows_field {
                payload.insert(
                    field.to_string(),
                    json!([{"stk_cd": "005930", "stk_nm": "Samsung", "cur_prc": "71200"}]),
                );
            }
            ToolResult::Success {
                payload,
                continuation: ContinuationState::exhausted(),
            }
        }
    }

    struct StubGenerator;

    #[async_trait]
    impl QueryGenerator for StubGenerator {
        async fn generate(&self, request: &str) -> Result<Vec<Query>> {
            Ok((0..4)
                .map(|index| Query {
                    index,
                    text: format!("{request} angle {index}"),
                })
                .collect())
        }
    }

    struct StubWorker;

    #[async_trait]
    impl SearchWorker for StubWorker {
        async fn run(&self, queries: Vec<Query>) -> Result<Vec<SearchResult>> {
            Ok(queries
                .into_iter()
                .map(|query| SearchResult {
                    summary: "finding".to_string(),
                    sources: vec![Source {
                        title: "src".to_string(),
                        url: format!("https://example.com/{}", query.index),
                        snippet: String::new(),
                    }],
                    query,
                    error: None,
                })
                .collect())
        }
    }

    struct StubTrends;

    #[async_trait]
    impl TrendProvider for StubTrends {
        async fn interest_over_time(
            &self,
            _keyword: &str,
            _window: TrendWindow,
        ) -> Result<Vec<f64>> {
            Ok(vec![50.0; 360])
        }
    }

    fn search_pipeline() -> SearchPipeline {
        let workers: [Arc<dyn SearchWorker>; GROUP_COUNT] =
            [Arc::new(StubWorker), Arc::new(StubWorker), Arc::new(StubWorker)];
        SearchPipeline::new(Arc::new(StubGenerator), workers)
    }

    fn coordinator(tokens: FakeTokens, transport: CannedTransport) -> Coordinator {
        Coordinator::new(
            Arc::new(tokens),
            ToolInvoker::new(Arc::new(transport)),
            search_pipeline(),
            Some(TrendAnalyzer::new(Arc::new(StubTrends))),
        )
    }

    //
    // ---- brokerage path ----
    //

    #[tokio::test]
    async fn missing_token_short_circuits_brokerage_flow() {
        let coordinator = coordinator(FakeTokens::failing(), CannedTransport::new());

        let err = coordinator
            .run("show me the volume surge ranking")
            .await
            .expect_err("must abort");

        assert!(matches!(err, OrchestrationError::Auth(_)));
        let payload = Coordinator::error_payload(&err);
        assert_eq!(payload.kind, "authentication_failed");
    }

    #[tokio::test]
    async fn volume_domain_collects_all_endpoints() {
        let coordinator = coordinator(FakeTokens::ok(), CannedTransport::new());

        let report = coordinator
            .run("show me the volume surge ranking")
            .await
            .expect("report");

        assert_eq!(report.domain, "volume_momentum");
        assert_eq!(report.findings.len(), ToolSetId::VolumeMomentum.endpoints().len());
        assert!(report.partial_failures.is_empty());
        assert!(report.trend.is_none());
    }

    #[tokio::test]
    async fn failing_endpoint_becomes_partial_failure() {
        let coordinator = coordinator(FakeTokens::ok(), CannedTransport::failing("ka10030"));

        let report = coordinator
            .run("show me the volume surge ranking")
            .await
            .expect("report");

        assert_eq!(report.findings.len(), 4);
        assert_eq!(report.partial_failures.len(), 1);
        let failure = &report.partial_failures[0];
        assert_eq!(failure.endpoint.as_deref(), Some("ka10030"));
        assert_eq!(failure.kind, "transport_failure");
        assert!(report.conclusion.contains("4 of 5"));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_calls() {
        let tokens = Arc::new(FakeTokens::expired());
        let transport = Arc::new(CannedTransport::new());
        let coordinator = Coordinator::new(
            tokens.clone(),
            ToolInvoker::new(transport.clone()),
            search_pipeline(),
            None,
        );

        let report = coordinator
            .run("foreign net buy leaders by institution")
            .await
            .expect("report");

        assert_eq!(report.domain, "institutional_flow");
        assert!(!report.findings.is_empty());
        // The expired initial token was replaced once, and every call went
        // out with the replacement.
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
        let seen = transport.tokens_seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|value| value == "fresh"));
    }

    //
    // ---- discovery path ----
    //

    #[tokio::test]
    async fn discovery_builds_trend_sources_and_findings() {
        let coordinator = coordinator(FakeTokens::ok(), CannedTransport::new());

        let report = coordinator
            .run("research emerging battery technology ideas")
            .await
            .expect("report");

        assert_eq!(report.domain, "discovery");
        assert_eq!(report.findings.len(), 4);
        assert_eq!(report.sources.len(), 4);
        let trend = report.trend.expect("trend section");
        assert_eq!(trend.recent_avg, 50.0);
        assert!(report.partial_failures.is_empty());
    }

    #[tokio::test]
    async fn trend_failure_degrades_not_fails() {
        struct NoData;

        #[async_trait]
        impl TrendProvider for NoData {
            async fn interest_over_time(
                &self,
                _keyword: &str,
                _window: TrendWindow,
            ) -> Result<Vec<f64>> {
                Ok(vec![])
            }
        }

        let coordinator = Coordinator::new(
            Arc::new(FakeTokens::ok()),
            ToolInvoker::new(Arc::new(CannedTransport::new())),
            search_pipeline(),
            Some(TrendAnalyzer::new(Arc::new(NoData))),
        );

        let report = coordinator
            .run("research emerging battery technology ideas")
            .await
            .expect("report");

        assert!(report.trend.is_none());
        assert_eq!(report.partial_failures.len(), 1);
        assert_eq!(report.partial_failures[0].kind, "trend_unavailable");
    }

    //
    // ---- parameters ----
    //

    #[test]
    fn default_parameters_satisfy_registered_requirements() {
        use crate::broker::endpoint;
        let today = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();

        for domain in [
            ToolSetId::VolumeMomentum,
            ToolSetId::InstitutionalFlow,
            ToolSetId::SectorTheme,
        ] {
            for id in domain.endpoints() {
                let params = default_parameters(id, None, today);
                let descriptor = endpoint(id).unwrap();
                for required in descriptor.required {
                    assert!(params.contains_key(*required), "{id} missing {required}");
                }
            }
        }

        // Per-stock operations are complete once a code is known.
        for id in ToolSetId::SingleStock.endpoints() {
            let params = default_parameters(id, Some("005930"), today);
            let descriptor = endpoint(id).unwrap();
            for required in descriptor.required {
                assert!(params.contains_key(*required), "{id} missing {required}");
            }
        }
    }

    #[test]
    fn stock_code_only_fills_per_stock_operations() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let params = default_parameters("ka10023", Some("005930"), today);
        assert!(!params.contains_key("stk_cd"));

        let params = default_parameters("ka10001", Some("005930"), today);
        assert_eq!(params["stk_cd"], json!("005930"));
    }
}
