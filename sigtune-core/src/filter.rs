//! Filter simulation — which historical signals a parameter vector would have
//! let through.
//!
//! This is a proxy, not a re-simulation. Feature values were computed under
//! the parameters live when each alert fired; the candidate vector only moves
//! the thresholds applied to those stored values. Re-deriving the features
//! would need the raw-bar indicator pipeline, which this crate does not own.

use crate::domain::{Bias, ParamVector, SignalType};
use crate::view::LabeledRow;
use serde::{Deserialize, Serialize};

/// Below this many surviving rows a trial is not scored.
pub const MIN_VIABLE_ROWS: usize = 10;

pub const RSI_BUY_TH: &str = "rsi_buy_th";
pub const RSI_SELL_TH: &str = "rsi_sell_th";
pub const VOL_MULT_BUY: &str = "vol_mult_buy";
pub const VOL_MULT_SELL: &str = "vol_mult_sell";
pub const VCP_RATIO_TH: &str = "vcp_ratio_th";
pub const DIST_ATH_MAX: &str = "dist_ath_max";

/// Thresholds read from a parameter vector. `None` disables that predicate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterThresholds {
    pub rsi_buy_th: Option<f64>,
    pub rsi_sell_th: Option<f64>,
    pub vol_mult_buy: Option<f64>,
    pub vol_mult_sell: Option<f64>,
    pub vcp_ratio_th: Option<f64>,
    pub dist_ath_max: Option<f64>,
}

impl FilterThresholds {
    pub fn from_params(params: &ParamVector) -> Self {
        Self {
            rsi_buy_th: params.get_f64(RSI_BUY_TH),
            rsi_sell_th: params.get_f64(RSI_SELL_TH),
            vol_mult_buy: params.get_f64(VOL_MULT_BUY),
            vol_mult_sell: params.get_f64(VOL_MULT_SELL),
            vcp_ratio_th: params.get_f64(VCP_RATIO_TH),
            dist_ath_max: params.get_f64(DIST_ATH_MAX),
        }
    }

    /// Whether `row` passes every enabled predicate for its own bias.
    ///
    /// Long: `rsi > rsi_buy_th`, `vol_mult > vol_mult_buy`.
    /// Short: `rsi < rsi_sell_th`, `vol_mult > vol_mult_sell`.
    /// Both: `vcp_ratio < vcp_ratio_th`, `dist_ath < dist_ath_max`.
    pub fn admits(&self, row: &LabeledRow) -> bool {
        let f = &row.features;
        let above = |value: f64, th: Option<f64>| th.map_or(true, |t| value > t);
        let below = |value: f64, th: Option<f64>| th.map_or(true, |t| value < t);

        let directional = match row.signal_type.bias() {
            Bias::Long => above(f.rsi, self.rsi_buy_th) && above(f.vol_mult, self.vol_mult_buy),
            Bias::Short => {
                below(f.rsi, self.rsi_sell_th) && above(f.vol_mult, self.vol_mult_sell)
            }
        };
        directional && below(f.vcp_ratio, self.vcp_ratio_th) && below(f.dist_ath, self.dist_ath_max)
    }
}

/// Rows of `signal_type` that survive `params`, in input order.
pub fn simulate_filter<'a>(
    rows: &'a [LabeledRow],
    signal_type: SignalType,
    params: &ParamVector,
) -> Vec<&'a LabeledRow> {
    let thresholds = FilterThresholds::from_params(params);
    rows.iter()
        .filter(|r| r.signal_type == signal_type && thresholds.admits(r))
        .collect()
}
