//! Keyword trend research
//!
//! The numeric interest series comes from an external provider behind
//! `TrendProvider`; this module fixes the two query windows (12 months,
//! 3 months, US region) and derives the summary labels from them using the
//! normalizer's threshold rules.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OrchestrationError;
use crate::models::{Seasonality, TrendSummary};
use crate::normalizer::{classify_direction, classify_persistence};
use crate::Result;

/// Region the interest series is scoped to.
pub const TREND_GEO: &str = "US";

/// Points per month at the provider's daily resolution.
const POINTS_PER_MONTH: usize = 30;

/// Coefficient-of-variation threshold above which monthly interest is
/// considered seasonal.
const SEASONALITY_CV_THRESHOLD: f64 = 0.3;

/// The two fixed lookback windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendWindow {
    TwelveMonths,
    ThreeMonths,
}

impl TrendWindow {
    pub fn timeframe(&self) -> &'static str {
        match self {
            TrendWindow::TwelveMonths => "today 12-m",
            TrendWindow::ThreeMonths => "today 3-m",
        }
    }
}

/// Time-indexed interest series for one keyword. External collaborator.
#[async_trait]
pub trait TrendProvider: Send + Sync {
    async fn interest_over_time(&self, keyword: &str, window: TrendWindow) -> Result<Vec<f64>>;
}

//
// ================= HTTP provider =================
//

#[derive(Debug, Serialize)]
struct InterestRequest<'a> {
    keyword: &'a str,
    timeframe: &'static str,
    geo: &'static str,
}

#[derive(Debug, Deserialize)]
struct InterestResponse {
    #[serde(default)]
    points: Vec<f64>,
}

/// Client for a deployed trend statistics service.
pub struct TrendApiClient {
    client: Client,
    base_url: String,
}

impl TrendApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TrendProvider for TrendApiClient {
    async fn interest_over_time(&self, keyword: &str, window: TrendWindow) -> Result<Vec<f64>> {
        let url = format!("{}/api/v1/trends/interest", self.base_url);
        let body = InterestRequest {
            keyword,
            timeframe: window.timeframe(),
            geo: TREND_GEO,
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestrationError::TrendError(format!("trend request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestrationError::TrendError(format!(
                "trend service returned {status}"
            )));
        }

        let parsed: InterestResponse = response
            .json()
            .await
            .map_err(|e| OrchestrationError::TrendError(format!("invalid trend payload: {e}")))?;

        Ok(parsed.points)
    }
}

//
// ================= Analysis =================

pub struct TrendAnalyzer {
    provider: Arc<dyn TrendProvider>,
}

impl TrendAnalyzer {
    pub fn new(provider: Arc<dyn TrendProvider>) -> Self {
        Self { provider }
    }

    /// Build the trend section for one keyword: fetch both windows, then
    /// derive direction, persistence and seasonality.
    pub async fn summarize(&self, keyword: &str) -> Result<TrendSummary> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(OrchestrationError::TrendError("empty keyword".to_string()));
        }

        let yearly = self
            .provider
            .interest_over_time(keyword, TrendWindow::TwelveMonths)
            .await?;
        let recent = self
            .provider
            .interest_over_time(keyword, TrendWindow::ThreeMonths)
            .await?;

        if yearly.is_empty() && recent.is_empty() {
            return Err(OrchestrationError::TrendError(format!(
                "no interest data for '{keyword}'"
            )));
        }

        let yearly_avg = mean(&yearly);
        let recent_avg = mean(&recent);

        let direction = classify_direction(recent_avg, yearly_avg);
        let persistence = {
            let (recent_window, prior_window) = split_recent_prior(&yearly);
            classify_persistence(mean(recent_window), mean(prior_window))
        };
        let seasonality = classify_seasonality(&yearly);

        debug!(
            keyword,
            recent_avg,
            yearly_avg,
            ?direction,
            ?persistence,
            ?seasonality,
            "Trend summary"
        );

        Ok(TrendSummary {
            keyword: keyword.to_string(),
            recent_avg,
            yearly_avg,
            direction,
            persistence,
            seasonality,
        })
    }
}

fn mean(points: &[f64]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().sum::<f64>() / points.len() as f64
}

/// Split the 12-month series into its recent quarter and the prior rest:
/// the last 90 points against everything before them, or a proportional
/// quarter for shorter series.
fn split_recent_prior(series: &[f64]) -> (&[f64], &[f64]) {
    if series.is_empty() {
        return (&[], &[]);
    }
    let recent_len = if series.len() >= 90 {
        90
    } else {
        (series.len() / 4).max(1)
    };
    let split = series.len() - recent_len;
    (&series[split..], &series[..split])
}

/// Monthly coefficient of variation over the yearly series. Fewer than 12
/// points cannot support the call; fewer than 4 monthly buckets reads as
/// non-seasonal.
fn classify_seasonality(series: &[f64]) -> Seasonality {
    if series.len() < 12 {
        return Seasonality::InsufficientData;
    }

    let monthly: Vec<f64> = series
        .chunks(POINTS_PER_MONTH)
        .map(mean)
        .collect();

    if monthly.len() < 4 {
        return Seasonality::NonSeasonal;
    }

    let overall = mean(&monthly);
    if overall <= 0.0 {
        return Seasonality::NonSeasonal;
    }

    let variance = monthly
        .iter()
        .map(|m| (m - overall).powi(2))
        .sum::<f64>()
        / monthly.len() as f64;
    let cv = variance.sqrt() / overall;

    if cv > SEASONALITY_CV_THRESHOLD {
        Seasonality::Seasonal
    } else {
        Seasonality::NonSeasonal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TrendDirection, TrendPersistence};

    struct FakeProvider {
        yearly: Vec<f64>,
        recent: Vec<f64>,
    }

    #[async_trait]
    impl TrendProvider for FakeProvider {
        async fn interest_over_time(
            &self,
            _keyword: &str,
            window: TrendWindow,
        ) -> Result<Vec<f64>> {
            Ok(match window {
                TrendWindow::TwelveMonths => self.yearly.clone(),
                TrendWindow::ThreeMonths => self.recent.clone(),
            })
        }
    }

    #[tokio::test]
    async fn rising_interest_reads_up_and_sustained() {
        // Flat year around 50 with a modestly higher recent quarter.
        let mut yearly = vec![50.0; 270];
        yearly.extend(vec![65.0; 90]);
        let provider = FakeProvider {
            yearly,
            recent: vec![65.0; 90],
        };

        let analyzer = TrendAnalyzer::new(Arc::new(provider));
        let summary = analyzer.summarize("solid state battery").await.expect("ok");

        assert_eq!(summary.direction, TrendDirection::Up);
        assert_eq!(summary.persistence, TrendPersistence::Sustained);
        assert_eq!(summary.keyword, "solid state battery");
    }

    #[tokio::test]
    async fn spike_reads_one_off() {
        // Near-zero year, recent quarter more than doubled.
        let mut yearly = vec![10.0; 270];
        yearly.extend(vec![45.0; 90]);
        let provider = FakeProvider {
            yearly,
            recent: vec![45.0; 90],
        };

        let analyzer = TrendAnalyzer::new(Arc::new(provider));
        let summary = analyzer.summarize("meme stock").await.expect("ok");

        assert_eq!(summary.direction, TrendDirection::Up);
        assert_eq!(summary.persistence, TrendPersistence::OneOff);
    }

    #[tokio::test]
    async fn no_data_is_an_error() {
        let analyzer = TrendAnalyzer::new(Arc::new(FakeProvider {
            yearly: vec![],
            recent: vec![],
        }));
        assert!(analyzer.summarize("nothing").await.is_err());
    }

    #[tokio::test]
    async fn empty_keyword_is_rejected() {
        let analyzer = TrendAnalyzer::new(Arc::new(FakeProvider {
            yearly: vec![1.0],
            recent: vec![1.0],
        }));
        assert!(analyzer.summarize("  ").await.is_err());
    }

    #[test]
    fn short_series_is_insufficient_for_seasonality() {
        assert_eq!(classify_seasonality(&[1.0; 11]), Seasonality::InsufficientData);
    }

    #[test]
    fn alternating_months_read_seasonal() {
        // Months alternating 10 / 90: CV well above the threshold.
        let mut series = Vec::new();
        for month in 0..12 {
            let level = if month % 2 == 0 { 10.0 } else { 90.0 };
            series.extend(vec![level; POINTS_PER_MONTH]);
        }
        assert_eq!(classify_seasonality(&series), Seasonality::Seasonal);
    }

    #[test]
    fn steady_months_read_non_seasonal() {
        let series = vec![42.0; 360];
        assert_eq!(classify_seasonality(&series), Seasonality::NonSeasonal);
    }

    #[test]
    fn recent_prior_split() {
        let series: Vec<f64> = (0..360).map(|i| i as f64).collect();
        let (recent, prior) = split_recent_prior(&series);
        assert_eq!(recent.len(), 90);
        assert_eq!(prior.len(), 270);
        assert_eq!(recent[0], 270.0);

        let short: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let (recent, prior) = split_recent_prior(&short);
        assert_eq!(recent.len(), 2);
        assert_eq!(prior.len(), 6);
    }
}
