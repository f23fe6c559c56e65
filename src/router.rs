//! Intent Router
//!
//! Maps a free-text request to exactly one research domain, which selects
//! the tool-set attached to the downstream invocation path. The router
//! never invokes tools itself, and it never fails upward: an ambiguous
//! query resolves to a best-guess domain with a logged warning.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::error::RouterError;

/// Research domains, each bound to a fixed brokerage tool-set (discovery
/// routes to the search fan-out instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolSetId {
    VolumeMomentum,
    InstitutionalFlow,
    SectorTheme,
    SingleStock,
    Discovery,
}

impl ToolSetId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolSetId::VolumeMomentum => "volume_momentum",
            ToolSetId::InstitutionalFlow => "institutional_flow",
            ToolSetId::SectorTheme => "sector_theme",
            ToolSetId::SingleStock => "single_stock",
            ToolSetId::Discovery => "discovery",
        }
    }

    /// Brokerage opcodes activated for this domain. Empty for discovery,
    /// which is served by the parallel search path.
    pub fn endpoints(&self) -> &'static [&'static str] {
        match self {
            ToolSetId::VolumeMomentum => {
                &["ka10023", "ka10030", "ka10032", "ka10027", "ka10029"]
            }
            ToolSetId::InstitutionalFlow => {
                &["ka10131", "ka90009", "ka10035", "ka10044", "ka10065"]
            }
            ToolSetId::SectorTheme => {
                &["ka10101", "ka20001", "ka20002", "ka20003", "ka90001", "ka90002"]
            }
            ToolSetId::SingleStock => {
                &["kt00004", "ka10001", "ka10081", "ka10045", "ka90013", "ka10014", "ka20001"]
            }
            ToolSetId::Discovery => &[],
        }
    }
}

/// Static keyword lists — zero allocation
const VOLUME_KEYWORDS: &[&str] = &[
    "volume", "surge", "momentum", "most traded", "trading value", "turnover",
    "gainers", "losers", "price change", "ranking", "top stocks", "spike",
];

const FLOW_KEYWORDS: &[&str] = &[
    "institution", "institutional", "foreign", "net buy", "net sell",
    "supply", "demand", "investor flow", "smart money", "accumulation",
];

const SECTOR_KEYWORDS: &[&str] = &[
    "sector", "industry", "theme", "semiconductor", "battery", "bio",
    "defense", "energy", "financials", "index",
];

const SINGLE_STOCK_KEYWORDS: &[&str] = &[
    "fundamental", "fundamentals", "per", "pbr", "eps", "roe", "market cap",
    "short selling", "chart", "candle", "this stock", "my account", "holdings",
];

const DISCOVERY_KEYWORDS: &[&str] = &[
    "find", "discover", "research", "outlook", "trend", "news", "what's hot",
    "opportunities", "emerging", "ideas", "prospects",
];

lazy_static! {
    /// Six consecutive digits bounded by non-digits: a listed stock code.
    static ref STOCK_CODE: Regex = Regex::new(r"\b(\d{6})\b").expect("valid pattern");
}

/// Extract a six-digit stock code from free text, if present.
pub fn extract_stock_code(text: &str) -> Option<String> {
    STOCK_CODE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct IntentRouter;

impl IntentRouter {
    /// Classify free text into one research domain. Ambiguity is internal
    /// only: the caller always receives a single best guess.
    pub fn route(query: &str) -> ToolSetId {
        match Self::try_classify(query) {
            Ok(domain) => domain,
            Err(e) => {
                warn!(query = %query, error = %e, "Falling back to discovery domain");
                ToolSetId::Discovery
            }
        }
    }

    /// Strict classification: errs when no domain signal is present.
    pub fn try_classify(query: &str) -> Result<ToolSetId, RouterError> {
        let text = query.to_lowercase();

        // An explicit stock code is the strongest signal there is.
        if extract_stock_code(&text).is_some() {
            return Ok(ToolSetId::SingleStock);
        }

        let scores = [
            (ToolSetId::VolumeMomentum, score(&text, VOLUME_KEYWORDS)),
            (ToolSetId::InstitutionalFlow, score(&text, FLOW_KEYWORDS)),
            (ToolSetId::SectorTheme, score(&text, SECTOR_KEYWORDS)),
            (ToolSetId::SingleStock, score(&text, SINGLE_STOCK_KEYWORDS)),
            (ToolSetId::Discovery, score(&text, DISCOVERY_KEYWORDS)),
        ];

        // First strictly-greatest score wins; the fixed ordering above makes
        // ties deterministic.
        let mut best = scores[0];
        for candidate in &scores[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }

        if best.1 == 0 {
            return Err(RouterError::AmbiguousOrUnclassifiable(query.to_string()));
        }

        Ok(best.0)
    }
}

fn score(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(**kw)).count()
}
