//! Market Research Orchestrator
//!
//! Routes natural-language financial and marketing queries to the right
//! tool-set, composes calls to brokerage, search, and trend-analysis APIs,
//! and synthesizes the results into structured reports:
//! - Acquires and propagates short-lived brokerage access tokens
//! - Classifies intent into one of five research domains
//! - Pages through brokerage endpoints under a shared continuation protocol
//! - Fans research out across three parallel search workers
//! - Normalizes heterogeneous API payloads into one reporting schema
//!
//! FLOW:
//! QUERY → TOKEN → ROUTE → INVOKE (paged) | SEARCH (fan-out) → NORMALIZE → REPORT

pub mod api;
pub mod broker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gemini;
pub mod models;
pub mod normalizer;
pub mod router;
pub mod search;
pub mod trends;

pub use error::Result;

// Re-export common types
pub use coordinator::Coordinator;
pub use models::*;
pub use router::{IntentRouter, ToolSetId};
