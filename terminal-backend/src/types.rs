//! Backend API request and response types

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use terminal_core::{PricePoint, TerminalError, TerminalResult};

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerRequest<'a> {
    pub company_name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesRequest<'a> {
    pub ticker: &'a str,
    pub timeframe: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingRequest<'a> {
    pub ticker: &'a str,
}

// ============================================================================
// Responses
// ============================================================================

/// Response from `/getTicker`
#[derive(Debug, Clone, Deserialize)]
pub struct TickerResponse {
    #[serde(default)]
    pub ticker: Option<String>,
}

/// Response from `/getlivedata`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveDataResponse {
    #[serde(default)]
    pub live_data: Option<Vec<ApiPricePoint>>,
    #[serde(default)]
    pub company: Option<String>,
}

/// Response from `/predictionOnTechnical`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    #[serde(default)]
    pub live_data: Option<Vec<ApiPricePoint>>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub prediction: Option<Vec<ApiPricePoint>>,
}

/// Response from `/getstocks`
#[derive(Debug, Clone, Deserialize)]
pub struct StocksResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub stocks: Vec<serde_json::Value>,
}

/// A `{date, close}` point as the backend sends it
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPricePoint {
    pub date: ApiDate,
    #[serde(default)]
    pub close: Option<Decimal>,
}

/// Dates arrive either as epoch milliseconds or as text
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ApiDate {
    Millis(i64),
    Text(String),
}

impl ApiPricePoint {
    pub fn to_price_point(&self) -> TerminalResult<PricePoint> {
        let timestamp = match &self.date {
            ApiDate::Millis(ms) => *ms,
            ApiDate::Text(text) => parse_date_millis(text)?,
        };
        let close = self
            .close
            .ok_or_else(|| TerminalError::parse(format!("Missing close price at {:?}", self.date)))?;

        Ok(PricePoint::new(timestamp, close))
    }
}

/// Convert a list of wire points, failing on the first undecodable one
pub fn to_price_points(points: &[ApiPricePoint]) -> TerminalResult<Vec<PricePoint>> {
    points.iter().map(ApiPricePoint::to_price_point).collect()
}

/// Parse a backend date string to epoch milliseconds (naive values are UTC)
pub fn parse_date_millis(text: &str) -> TerminalResult<i64> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.timestamp_millis());
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
        .ok_or_else(|| TerminalError::parse(format!("Unrecognised date '{}'", text)))
}
