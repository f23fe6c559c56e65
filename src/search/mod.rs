//! Parallel search fan-out/fan-in
//!
//! A research request is expanded into N sub-queries, split across exactly
//! three search workers by `index mod 3`, executed concurrently, and merged
//! back in generation order. One group failing wholesale never aborts the
//! fan-in: its queries come back as failure placeholders.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::OrchestrationError;
use crate::gemini::GeminiClient;
use crate::models::{Query, ReportBundle, SearchResult};
use crate::Result;

/// Fixed worker count; group assignment is `index mod 3`.
pub const GROUP_COUNT: usize = 3;

/// Hard ceiling on generated sub-queries, matching the very-complex band.
pub const MAX_QUERIES: usize = 12;

/// Pipeline stages, traced as the fan-out advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Generating,
    Dispatching,
    Awaiting,
    Merging,
    Done,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Generating => "generating",
            Phase::Dispatching => "dispatching",
            Phase::Awaiting => "awaiting",
            Phase::Merging => "merging",
            Phase::Done => "done",
        }
    }
}

/// Produces the sub-queries for one research request. The count is a policy
/// decision of the implementation: 3–6 for simple questions, 6–9 for
/// complex, 9–12 for very complex.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(&self, request: &str) -> Result<Vec<Query>>;
}

/// Executes one group's queries and returns a result per query, in the
/// order given. Whether the group works sequentially or concurrently is the
/// implementation's choice; the merge re-sorts by original index anyway.
#[async_trait]
pub trait SearchWorker: Send + Sync {
    async fn run(&self, queries: Vec<Query>) -> Result<Vec<SearchResult>>;
}

//
// ================= Query generation =================
//

/// Offline generator: derives the query count from simple complexity cues
/// and instantiates fixed research angles. Keeps the pipeline functional
/// without an LLM dependency.
pub struct HeuristicQueryGenerator;

const RESEARCH_ANGLES: &[&str] = &[
    "current state of",
    "key players in",
    "recent developments in",
    "market size and growth of",
    "risks and headwinds for",
    "outlook and forecasts for",
    "regulation and policy affecting",
    "competitive landscape of",
    "supply chain of",
    "investment flows into",
    "technology shifts in",
    "consumer demand for",
];

impl HeuristicQueryGenerator {
    fn query_count(request: &str) -> usize {
        let words = request.split_whitespace().count();
        let clauses = request
            .matches(|c| c == ',' || c == ';' || c == '?')
            .count()
            + request.to_lowercase().matches(" and ").count();

        // Band midpoints: simple 3-6, complex 6-9, very complex 9-12.
        if words > 25 || clauses >= 4 {
            10
        } else if words > 12 || clauses >= 2 {
            7
        } else {
            4
        }
    }
}

#[async_trait]
impl QueryGenerator for HeuristicQueryGenerator {
    async fn generate(&self, request: &str) -> Result<Vec<Query>> {
        let topic = request.trim();
        if topic.is_empty() {
            return Err(OrchestrationError::SearchError(
                "empty research request".to_string(),
            ));
        }

        let count = Self::query_count(topic).min(MAX_QUERIES);
        let queries = RESEARCH_ANGLES
            .iter()
            .take(count)
            .enumerate()
            .map(|(index, angle)| Query {
                index,
                text: format!("{angle} {topic}"),
            })
            .collect();

        Ok(queries)
    }
}

/// LLM-backed generator in the same contract: one query per output line.
pub struct GeminiQueryGenerator {
    client: Arc<GeminiClient>,
}

const QUERY_GENERATION_SYSTEM: &str = "\
You expand a research request into distinct web search queries.
Decide the count by complexity: 3-6 for simple requests, 6-9 for complex,
9-12 for very complex. Cover different angles (current state, players,
data, policy, risks, outlook) without overlap. Output one query per line,
nothing else.";

impl GeminiQueryGenerator {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryGenerator for GeminiQueryGenerator {
    async fn generate(&self, request: &str) -> Result<Vec<Query>> {
        let text = self
            .client
            .generate(QUERY_GENERATION_SYSTEM, request)
            .await?;

        let queries: Vec<Query> = text
            .lines()
            .map(|line| line.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == ')' || c == ' '))
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(MAX_QUERIES)
            .enumerate()
            .map(|(index, line)| Query {
                index,
                text: line.to_string(),
            })
            .collect();

        if queries.is_empty() {
            return Err(OrchestrationError::SearchError(
                "query generation produced no queries".to_string(),
            ));
        }

        Ok(queries)
    }
}

//
// ================= Workers =================
//

/// Search worker backed by grounded generation: each query is answered with
/// web-search grounding and its attributions become the sources.
pub struct GroundedSearchWorker {
    client: Arc<GeminiClient>,
}

const SEARCH_SYSTEM: &str = "\
Answer the query using web search grounding. Summarize the findings in a
few concise sentences aimed at an equity research reader.";

impl GroundedSearchWorker {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchWorker for GroundedSearchWorker {
    async fn run(&self, queries: Vec<Query>) -> Result<Vec<SearchResult>> {
        let mut results = Vec::with_capacity(queries.len());

        for query in queries {
            match self.client.generate_grounded(SEARCH_SYSTEM, &query.text).await {
                Ok(answer) => results.push(SearchResult {
                    query,
                    sources: answer.sources,
                    summary: answer.text,
                    error: None,
                }),
                Err(e) => {
                    // A single failed query degrades to a placeholder; the
                    // rest of the group proceeds.
                    warn!(query = %query.text, error = %e, "Search query failed");
                    results.push(SearchResult::failure(query, &e.to_string()));
                }
            }
        }

        Ok(results)
    }
}

//
// ================= Fan-out / fan-in =================
//

/// Deterministic round-robin partition: group k holds queries with
/// `index mod 3 == k`, so group sizes differ by at most 1.
pub fn partition(queries: &[Query]) -> [Vec<Query>; GROUP_COUNT] {
    let mut groups: [Vec<Query>; GROUP_COUNT] = Default::default();
    for query in queries {
        groups[query.group()].push(query.clone());
    }
    groups
}

pub struct SearchPipeline {
    generator: Arc<dyn QueryGenerator>,
    workers: [Arc<dyn SearchWorker>; GROUP_COUNT],
}

impl SearchPipeline {
    pub fn new(
        generator: Arc<dyn QueryGenerator>,
        workers: [Arc<dyn SearchWorker>; GROUP_COUNT],
    ) -> Self {
        Self { generator, workers }
    }

    /// Pipeline backed entirely by one grounded client, one worker per
    /// group.
    pub fn grounded(client: Arc<GeminiClient>) -> Self {
        Self {
            generator: Arc::new(GeminiQueryGenerator::new(client.clone())),
            workers: [
                Arc::new(GroundedSearchWorker::new(client.clone())),
                Arc::new(GroundedSearchWorker::new(client.clone())),
                Arc::new(GroundedSearchWorker::new(client)),
            ],
        }
    }

    /// Run the full fan-out/fan-in cycle for one request.
    pub async fn run(&self, request: &str) -> Result<ReportBundle> {
        debug!(phase = Phase::Generating.as_str(), request, "Search pipeline");
        let queries = self.generator.generate(request).await?;
        if queries.is_empty() {
            return Err(OrchestrationError::SearchError(
                "no sub-queries generated".to_string(),
            ));
        }

        debug!(
            phase = Phase::Dispatching.as_str(),
            count = queries.len(),
            "Partitioning queries"
        );
        let groups = partition(&queries);

        debug!(phase = Phase::Awaiting.as_str(), "Dispatching 3 workers");
        let futures = groups
            .iter()
            .cloned()
            .zip(self.workers.iter())
            .map(|(group, worker)| {
                let worker = Arc::clone(worker);
                async move {
                    let assigned = group.clone();
                    match worker.run(group).await {
                        Ok(results) => results,
                        Err(e) => {
                            // Whole-group failure: placeholder per query,
                            // never abort the fan-in.
                            warn!(error = %e, "Search group failed");
                            assigned
                                .into_iter()
                                .map(|q| SearchResult::failure(q, &e.to_string()))
                                .collect()
                        }
                    }
                }
            });

        let group_results = join_all(futures).await;

        debug!(phase = Phase::Merging.as_str(), "Merging group results");
        let mut results: Vec<SearchResult> = group_results.into_iter().flatten().collect();
        results.sort_by_key(|r| r.query.index);

        debug!(
            phase = Phase::Done.as_str(),
            results = results.len(),
            failures = results.iter().filter(|r| r.is_failure()).count(),
            "Search pipeline complete"
        );

        Ok(ReportBundle { results })
    }
}
