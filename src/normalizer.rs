//! Response normalizer
//!
//! Maps each endpoint's abbreviated wire fields into a stable internal
//! schema before the reporting stage sees them, validating required fields
//! at the boundary instead of propagating missing-key lookups. Also owns
//! the two threshold rules derived fields are computed with:
//! direction (±20% relative change) and persistence (>100% relative
//! change between recent and prior windows).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::broker::endpoints::{endpoint, EndpointDescriptor, PayloadShape};
use crate::error::ToolError;
use crate::models::{TrendDirection, TrendPersistence};

/// Relative-change threshold for the up/down/flat label.
const DIRECTION_THRESHOLD: f64 = 0.2;

/// Relative-change threshold separating a one-off spike from sustained
/// interest.
const PERSISTENCE_THRESHOLD: f64 = 1.0;

//
// ================= Derived-field rules =================
//

/// Label the move between two window averages. A non-positive past average
/// cannot anchor a relative change, so it reads as flat (zero-division
/// guard).
pub fn classify_direction(recent_avg: f64, past_avg: f64) -> TrendDirection {
    if past_avg <= 0.0 {
        return TrendDirection::Flat;
    }
    let change = (recent_avg - past_avg) / past_avg;
    if change > DIRECTION_THRESHOLD {
        TrendDirection::Up
    } else if change < -DIRECTION_THRESHOLD {
        TrendDirection::Down
    } else {
        TrendDirection::Flat
    }
}

/// Separate a one-off spike from sustained interest by comparing the recent
/// window against the prior one.
pub fn classify_persistence(recent_avg: f64, prior_avg: f64) -> TrendPersistence {
    if prior_avg <= 0.0 {
        return TrendPersistence::Unknown;
    }
    let change = (recent_avg - prior_avg) / prior_avg;
    if change.abs() > PERSISTENCE_THRESHOLD {
        TrendPersistence::OneOff
    } else {
        TrendPersistence::Sustained
    }
}

//
// ================= Normalized payloads =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockQuote {
    pub code: String,
    pub name: String,
    pub current_price: String,
    pub change_rate: Option<String>,
    pub volume: Option<String>,
    pub market_cap: Option<String>,
    pub per: Option<String>,
    pub eps: Option<String>,
    pub roe: Option<String>,
    pub pbr: Option<String>,
    pub year_high: Option<String>,
    pub year_low: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingEntry {
    pub code: String,
    pub name: String,
    pub current_price: Option<String>,
    pub change_rate: Option<String>,
    pub volume: Option<String>,
    pub trading_value: Option<String>,
    pub surge_rate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowEntry {
    pub code: Option<String>,
    pub name: Option<String>,
    pub current_price: Option<String>,
    pub change_rate: Option<String>,
    pub institution_net_buy: Option<String>,
    pub foreign_net_buy: Option<String>,
    pub net_buy_volume: Option<String>,
    pub net_buy_amount: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectorEntry {
    pub sector_code: Option<String>,
    pub sector_name: Option<String>,
    pub theme_code: Option<String>,
    pub theme_name: Option<String>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub current_price: Option<String>,
    pub change_rate: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub date: String,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: String,
    pub volume: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountSummary {
    pub total_value: Option<String>,
    pub total_purchase_amount: Option<String>,
    pub deposit: Option<String>,
    pub holdings: Vec<FlowEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum NormalizedPayload {
    Quote(StockQuote),
    Ranking(Vec<RankingEntry>),
    Flow(Vec<FlowEntry>),
    Sector(Vec<SectorEntry>),
    Chart(Vec<Candle>),
    Account(AccountSummary),
    /// Endpoints without a dedicated shape: renamed fields passed through.
    Table {
        fields: Map<String, Value>,
        rows: Vec<Map<String, Value>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRecord {
    pub endpoint_id: String,
    pub operation: String,
    /// Present when the invoker truncated the row array.
    pub limited_to: Option<u64>,
    pub total_count: Option<u64>,
    pub payload: NormalizedPayload,
}

//
// ================= Normalization =================
//

/// Normalize one endpoint's raw payload. Pure: calling it twice on the same
/// input yields identical output.
pub fn normalize(
    endpoint_id: &str,
    raw: &Map<String, Value>,
) -> Result<NormalizedRecord, ToolError> {
    let descriptor = endpoint(endpoint_id).ok_or_else(|| {
        ToolError::MalformedResponse(format!("no normalization table for {endpoint_id}"))
    })?;

    let fields = rename_scalars(descriptor, raw);
    let rows = extract_rows(descriptor, raw)?;

    let payload = match descriptor.shape {
        PayloadShape::Quote => NormalizedPayload::Quote(quote_from(&fields, descriptor)?),
        PayloadShape::Ranking => NormalizedPayload::Ranking(
            rows.iter()
                .map(|row| ranking_from(row, descriptor))
                .collect::<Result<_, _>>()?,
        ),
        PayloadShape::Flow => {
            NormalizedPayload::Flow(rows.iter().map(flow_from).collect())
        }
        PayloadShape::Sector => NormalizedPayload::Sector(
            rows.iter()
                .map(|row| sector_from(row, descriptor))
                .collect::<Result<_, _>>()?,
        ),
        PayloadShape::Chart => NormalizedPayload::Chart(
            rows.iter()
                .map(|row| candle_from(row, descriptor))
                .collect::<Result<_, _>>()?,
        ),
        PayloadShape::Account => NormalizedPayload::Account(AccountSummary {
            total_value: get_str(&fields, "total_value"),
            total_purchase_amount: get_str(&fields, "total_purchase_amount"),
            deposit: get_str(&fields, "deposit"),
            holdings: rows.iter().map(flow_from).collect(),
        }),
        PayloadShape::Table => NormalizedPayload::Table { fields, rows },
    };

    Ok(NormalizedRecord {
        endpoint_id: endpoint_id.to_string(),
        operation: descriptor.name.to_string(),
        limited_to: raw.get("limited_to").and_then(Value::as_u64),
        total_count: raw.get("total_count").and_then(Value::as_u64),
        payload,
    })
}

/// Apply the descriptor's rename table to the payload's scalar fields,
/// leaving the row array and bookkeeping fields out.
fn rename_scalars(descriptor: &EndpointDescriptor, raw: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in raw {
        if Some(key.as_str()) == descriptor.rows_field {
            continue;
        }
        if matches!(key.as_str(), "limited_to" | "total_count" | "return_code" | "return_msg") {
            continue;
        }
        fields.insert(rename_field(descriptor, key), value.clone());
    }
    fields
}

fn rename_field(descriptor: &EndpointDescriptor, key: &str) -> String {
    descriptor
        .renames
        .iter()
        .find(|(from, _)| *from == key)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or_else(|| key.to_string())
}

fn extract_rows(
    descriptor: &EndpointDescriptor,
    raw: &Map<String, Value>,
) -> Result<Vec<Map<String, Value>>, ToolError> {
    let Some(field) = descriptor.rows_field else {
        return Ok(Vec::new());
    };
    let Some(value) = raw.get(field) else {
        return Ok(Vec::new());
    };

    let Value::Array(items) = value else {
        return Err(ToolError::MalformedResponse(format!(
            "{}: field {field} is not an array",
            descriptor.api_id
        )));
    };

    items
        .iter()
        .map(|item| match item {
            Value::Object(row) => {
                let mut renamed = Map::new();
                for (key, value) in row {
                    renamed.insert(rename_field(descriptor, key), value.clone());
                }
                Ok(renamed)
            }
            _ => Err(ToolError::MalformedResponse(format!(
                "{}: row in {field} is not an object",
                descriptor.api_id
            ))),
        })
        .collect()
}

/// Read a field as text; the brokerage encodes numbers as strings but the
/// mock host is looser about it.
fn get_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn require_str(
    map: &Map<String, Value>,
    key: &str,
    descriptor: &EndpointDescriptor,
) -> Result<String, ToolError> {
    get_str(map, key).ok_or_else(|| {
        ToolError::MalformedResponse(format!(
            "{}: required field {key} missing",
            descriptor.api_id
        ))
    })
}

fn quote_from(
    fields: &Map<String, Value>,
    descriptor: &EndpointDescriptor,
) -> Result<StockQuote, ToolError> {
    Ok(StockQuote {
        code: require_str(fields, "code", descriptor)?,
        name: require_str(fields, "name", descriptor)?,
        current_price: require_str(fields, "current_price", descriptor)?,
        change_rate: get_str(fields, "change_rate"),
        volume: get_str(fields, "volume"),
        market_cap: get_str(fields, "market_cap"),
        per: get_str(fields, "per"),
        eps: get_str(fields, "eps"),
        roe: get_str(fields, "roe"),
        pbr: get_str(fields, "pbr"),
        year_high: get_str(fields, "year_high"),
        year_low: get_str(fields, "year_low"),
    })
}

fn ranking_from(
    row: &Map<String, Value>,
    descriptor: &EndpointDescriptor,
) -> Result<RankingEntry, ToolError> {
    Ok(RankingEntry {
        code: require_str(row, "code", descriptor)?,
        name: require_str(row, "name", descriptor)?,
        current_price: get_str(row, "current_price"),
        change_rate: get_str(row, "change_rate"),
        volume: get_str(row, "volume"),
        trading_value: get_str(row, "trading_value"),
        surge_rate: get_str(row, "surge_rate"),
    })
}

fn flow_from(row: &Map<String, Value>) -> FlowEntry {
    FlowEntry {
        code: get_str(row, "code"),
        name: get_str(row, "name"),
        current_price: get_str(row, "current_price"),
        change_rate: get_str(row, "change_rate"),
        institution_net_buy: get_str(row, "institution_net_buy"),
        foreign_net_buy: get_str(row, "foreign_net_buy"),
        net_buy_volume: get_str(row, "net_buy_volume"),
        net_buy_amount: get_str(row, "net_buy_amount"),
    }
}

fn sector_from(
    row: &Map<String, Value>,
    descriptor: &EndpointDescriptor,
) -> Result<SectorEntry, ToolError> {
    let entry = SectorEntry {
        sector_code: get_str(row, "sector_code"),
        sector_name: get_str(row, "sector_name"),
        theme_code: get_str(row, "theme_code"),
        theme_name: get_str(row, "theme_name"),
        code: get_str(row, "code"),
        name: get_str(row, "name"),
        current_price: get_str(row, "current_price"),
        change_rate: get_str(row, "change_rate"),
    };

    if entry.sector_code.is_none()
        && entry.theme_code.is_none()
        && entry.code.is_none()
    {
        return Err(ToolError::MalformedResponse(format!(
            "{}: sector row carries no identifier",
            descriptor.api_id
        )));
    }

    Ok(entry)
}

fn candle_from(
    row: &Map<String, Value>,
    descriptor: &EndpointDescriptor,
) -> Result<Candle, ToolError> {
    let date = get_str(row, "date")
        .or_else(|| get_str(row, "time"))
        .ok_or_else(|| {
            ToolError::MalformedResponse(format!(
                "{}: candle row missing date/time",
                descriptor.api_id
            ))
        })?;

    Ok(Candle {
        date,
        open: get_str(row, "open"),
        high: get_str(row, "high"),
        low: get_str(row, "low"),
        close: require_str(row, "close", descriptor)?,
        volume: get_str(row, "volume"),
    })
}
