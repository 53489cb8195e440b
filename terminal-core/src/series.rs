//! Price series results and their display summary

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TerminalError;

/// A single closing price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Epoch milliseconds (UTC)
    pub timestamp: i64,
    /// Closing price
    pub close: Decimal,
}

impl PricePoint {
    pub fn new(timestamp: i64, close: Decimal) -> Self {
        Self { timestamp, close }
    }
}

/// Result of a live data request
///
/// `points` keep the order the backend returned them in (oldest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResult {
    pub success: bool,
    #[serde(rename = "liveData", default)]
    pub points: Vec<PricePoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SeriesResult {
    /// Successful result
    pub fn ok(points: Vec<PricePoint>, company: Option<String>) -> Self {
        Self {
            success: true,
            points,
            company,
            message: None,
        }
    }

    /// Failed result carrying a human-readable message and no points
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            points: Vec::new(),
            company: None,
            message: Some(message.into()),
        }
    }

    pub fn from_error(err: &TerminalError) -> Self {
        Self::failure(err.to_string())
    }

    /// Summary for display, see [`normalize`]
    pub fn summary(&self) -> DisplaySummary {
        normalize(self)
    }
}

/// Result of a prediction request: the live series plus forecast points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(flatten)]
    pub series: SeriesResult,
    #[serde(default)]
    pub prediction: Vec<PricePoint>,
}

impl PredictionResult {
    pub fn ok(points: Vec<PricePoint>, company: Option<String>, prediction: Vec<PricePoint>) -> Self {
        Self {
            series: SeriesResult::ok(points, company),
            prediction,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            series: SeriesResult::failure(message),
            prediction: Vec::new(),
        }
    }

    pub fn from_error(err: &TerminalError) -> Self {
        Self::failure(err.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.series.success
    }

    pub fn summary(&self) -> DisplaySummary {
        normalize(&self.series)
    }
}

/// Outcome of a training request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub success: bool,
    pub message: String,
}

impl TrainingResult {
    pub fn done() -> Self {
        Self {
            success: true,
            message: "Training Done".to_string(),
        }
    }

    pub fn from_error(err: &TerminalError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
        }
    }
}

/// Stocks known to the backend
///
/// Entries are passed through as returned; this layer does not interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StocksResult {
    pub success: bool,
    #[serde(default)]
    pub stocks: Vec<serde_json::Value>,
}

impl StocksResult {
    pub fn failure() -> Self {
        Self {
            success: false,
            stocks: Vec::new(),
        }
    }
}

/// Compact series shape consumed by chart widgets
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplaySummary {
    /// Last closing price
    pub current: Decimal,
    /// Percent change from the first to the last close
    pub change: Decimal,
    /// `[timestamp, close]` pairs in series order
    pub data: Vec<(i64, Decimal)>,
}

/// Reduce a series result to its display summary.
///
/// Unsuccessful or empty results give the zero summary. When the first close
/// is zero (or the division overflows) the change is reported as zero.
pub fn normalize(result: &SeriesResult) -> DisplaySummary {
    let (first, last) = match (result.points.first(), result.points.last()) {
        (Some(first), Some(last)) if result.success => (first, last),
        _ => return DisplaySummary::default(),
    };

    let data = result
        .points
        .iter()
        .map(|p| (p.timestamp, p.close))
        .collect();

    DisplaySummary {
        current: last.close,
        change: percent_change(first.close, last.close),
        data,
    }
}

fn percent_change(from: Decimal, to: Decimal) -> Decimal {
    if from.is_zero() {
        return Decimal::ZERO;
    }

    to.checked_sub(from)
        .and_then(|diff| diff.checked_div(from))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}
