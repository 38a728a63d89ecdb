//! Emission-time feature schema.
//!
//! Every default lives here. Alerts that omit a feature get the value below,
//! and nothing downstream re-applies its own fallback.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_RSI: f64 = 50.0;
pub const DEFAULT_VOL_MULT: f64 = 1.0;
pub const DEFAULT_VIX: f64 = 18.0;

/// Direction of a macro series over its lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    #[serde(other)]
    Flat,
}

/// HYG/IEF credit regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditRegime {
    Bear,
    #[default]
    #[serde(other)]
    Bull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroFeatures {
    pub vix: f64,
    pub dxy_trend: Trend,
    pub us10y_trend: Trend,
    pub hyg_ief: CreditRegime,
}

impl Default for MacroFeatures {
    fn default() -> Self {
        Self {
            vix: DEFAULT_VIX,
            dxy_trend: Trend::Flat,
            us10y_trend: Trend::Flat,
            hyg_ief: CreditRegime::Bull,
        }
    }
}

/// Indicator values captured when the alert fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSet {
    #[serde(rename = "trendScore", alias = "trend_score")]
    pub trend_score: f64,
    pub prob: f64,
    pub ema20_above_50: bool,
    pub ema_short: f64,
    pub ema_long: f64,
    pub rsi: f64,
    pub vol_mult: f64,
    pub vcp_ratio: f64,
    pub dist_ath: f64,
    #[serde(rename = "macro")]
    pub macro_ctx: MacroFeatures,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            trend_score: 0.0,
            prob: 0.0,
            ema20_above_50: false,
            ema_short: 0.0,
            ema_long: 0.0,
            rsi: DEFAULT_RSI,
            vol_mult: DEFAULT_VOL_MULT,
            vcp_ratio: 0.0,
            dist_ath: 0.0,
            macro_ctx: MacroFeatures::default(),
        }
    }
}

impl FeatureSet {
    /// Numeric feature by name, for ablation and export.
    pub fn numeric(&self, name: &str) -> Option<f64> {
        Some(match name {
            "trend_score" => self.trend_score,
            "prob" => self.prob,
            "ema20_above_50" => f64::from(u8::from(self.ema20_above_50)),
            "ema_short" => self.ema_short,
            "ema_long" => self.ema_long,
            "rsi" => self.rsi,
            "vol_mult" => self.vol_mult,
            "vcp_ratio" => self.vcp_ratio,
            "dist_ath" => self.dist_ath,
            "vix" => self.macro_ctx.vix,
            _ => return None,
        })
    }
}

/// Generator parameters that were live when the alert fired.
///
/// Unknown keys are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmittedParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub epsilon: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for EmittedParams {
    fn default() -> Self {
        Self {
            alpha: 0.8,
            beta: 0.35,
            gamma: 0.7,
            delta: 0.6,
            epsilon: 0.8,
            extra: BTreeMap::new(),
        }
    }
}
