//! Signal — one historical alert event with its emission-time context.

use super::features::{EmittedParams, FeatureSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Directional alert type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Buy,
    Sell,
    WatchUp,
    WatchDown,
}

/// Which side of the market a signal type leans towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Long,
    Short,
}

impl SignalType {
    pub const ALL: [SignalType; 4] = [
        SignalType::Buy,
        SignalType::Sell,
        SignalType::WatchUp,
        SignalType::WatchDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::WatchUp => "WATCH_UP",
            SignalType::WatchDown => "WATCH_DOWN",
        }
    }

    pub fn bias(&self) -> Bias {
        match self {
            SignalType::Buy | SignalType::WatchUp => Bias::Long,
            SignalType::Sell | SignalType::WatchDown => Bias::Short,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown signal type '{0}' (expected BUY, SELL, WATCH_UP or WATCH_DOWN)")]
pub struct ParseSignalTypeError(pub String);

impl FromStr for SignalType {
    type Err = ParseSignalTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(SignalType::Buy),
            "SELL" => Ok(SignalType::Sell),
            "WATCH_UP" => Ok(SignalType::WatchUp),
            "WATCH_DOWN" => Ok(SignalType::WatchDown),
            _ => Err(ParseSignalTypeError(s.to_string())),
        }
    }
}

/// OHLC of the signal bar, back-filled once by the labeler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarSnapshot {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A stored alert.
///
/// Immutable after creation apart from [`Signal::backfill_bar`], which the
/// labeler may apply exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: u64,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: String,
    pub signal_type: SignalType,
    #[serde(default)]
    pub features: FeatureSet,
    #[serde(default)]
    pub params: EmittedParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bar: Option<BarSnapshot>,
}

impl Signal {
    /// Set the signal-bar OHLC. Returns `false` (and changes nothing) if it
    /// was already set.
    pub fn backfill_bar(&mut self, bar: BarSnapshot) -> bool {
        if self.bar.is_some() {
            return false;
        }
        self.bar = Some(bar);
        true
    }
}
