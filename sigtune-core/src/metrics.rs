//! Performance metrics — pure functions over per-trade return sequences.
//!
//! Returns are fractions (0.02 = +2%). Nothing here looks at the store, the
//! search engine or the clock.

use crate::domain::{Bias, Horizon, SignalType};
use crate::serde_ext::extended_f64;
use crate::view::LabeledRow;
use serde::{Deserialize, Serialize};

/// Forward return a signal must clear to count as a hit.
pub const DEFAULT_HIT_THRESHOLD: f64 = 0.02;

/// Annual risk-free rate used by the aggregate report.
pub const RISK_FREE_RATE: f64 = 0.02;

const TRADING_DAYS: f64 = 252.0;

/// Fixed-key bundle of every metric for one signal type.
///
/// Return-based metrics use the 10-bar forward return. An empty input gives
/// the all-zero report, which means "no data", not an error.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsReport {
    #[serde(with = "extended_f64")]
    pub pf: f64,
    #[serde(with = "extended_f64")]
    pub mdd: f64,
    #[serde(with = "extended_f64")]
    pub win_rate: f64,
    #[serde(with = "extended_f64")]
    pub sharpe: f64,
    #[serde(with = "extended_f64")]
    pub avg_ret: f64,
    pub total_trades: usize,
    #[serde(with = "extended_f64")]
    pub psu_3: f64,
    #[serde(with = "extended_f64")]
    pub psu_5: f64,
    #[serde(with = "extended_f64")]
    pub psu_10: f64,
    #[serde(with = "extended_f64")]
    pub psu_20: f64,
}

impl MetricsReport {
    /// The "no data" sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn psu(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::H3 => self.psu_3,
            Horizon::H5 => self.psu_5,
            Horizon::H10 => self.psu_10,
            Horizon::H20 => self.psu_20,
        }
    }

    /// `(key, value)` pairs in report order, trade count widened to f64.
    pub fn entries(&self) -> [(&'static str, f64); 10] {
        [
            ("pf", self.pf),
            ("mdd", self.mdd),
            ("win_rate", self.win_rate),
            ("sharpe", self.sharpe),
            ("avg_ret", self.avg_ret),
            ("total_trades", self.total_trades as f64),
            ("psu_3", self.psu_3),
            ("psu_5", self.psu_5),
            ("psu_10", self.psu_10),
            ("psu_20", self.psu_20),
        ]
    }
}

/// Compute the full report for the rows of `signal_type`, in the order given.
pub fn calculate_all_metrics<'a, I>(
    rows: I,
    signal_type: SignalType,
    hit_threshold: f64,
) -> MetricsReport
where
    I: IntoIterator<Item = &'a LabeledRow>,
{
    let selected: Vec<&LabeledRow> = rows
        .into_iter()
        .filter(|r| r.signal_type == signal_type)
        .collect();
    if selected.is_empty() {
        return MetricsReport::empty();
    }

    let returns: Vec<f64> = selected.iter().map(|r| r.fwd_ret(Horizon::H10)).collect();
    let psu = signal_accuracy(&selected, signal_type.bias(), hit_threshold);

    MetricsReport {
        pf: profit_factor(&returns),
        mdd: max_drawdown(&returns),
        win_rate: win_rate(&returns),
        sharpe: sharpe_ratio(&returns, RISK_FREE_RATE),
        avg_ret: mean_f64(&returns),
        total_trades: selected.len(),
        psu_3: psu[Horizon::H3.index()],
        psu_5: psu[Horizon::H5.index()],
        psu_10: psu[Horizon::H10.index()],
        psu_20: psu[Horizon::H20.index()],
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Gross gains over gross losses.
///
/// `+inf` when there are gains and no losses; `0` when there are neither.
pub fn profit_factor(returns: &[f64]) -> f64 {
    let gross_profit: f64 = returns.iter().filter(|&&r| r > 0.0).sum();
    let gross_loss: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r.abs()).sum();

    if gross_loss == 0.0 {
        return if gross_profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    gross_profit / gross_loss
}

/// Largest peak-to-trough decline of the compounded return path, as a
/// positive fraction.
///
/// Order matters: returns are compounded in the order supplied. The path
/// starts at the first compounded point, matching how the labeled rows are
/// scored.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0_f64;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;

    for &r in returns {
        cumulative *= 1.0 + r;
        if cumulative > peak {
            peak = cumulative;
        }
        if peak > 0.0 {
            let dd = (cumulative - peak) / peak;
            if dd < worst {
                worst = dd;
            }
        }
    }
    worst.abs()
}

/// Fraction of returns strictly above zero.
pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let winners = returns.iter().filter(|&&r| r > 0.0).count();
    winners as f64 / returns.len() as f64
}

/// Annualized Sharpe ratio.
///
/// Sharpe = mean(r - rf/252) / std(r) * sqrt(252), sample std.
/// Returns 0.0 with fewer than 2 returns or zero variance.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    TRADING_DAYS.sqrt() * mean_f64(&excess) / std
}

/// Fraction of returns that clear `threshold` in the direction of `bias`:
/// `r > threshold` for long, `r < -threshold` for short.
pub fn hit_rate(returns: &[f64], bias: Bias, threshold: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let hits = returns
        .iter()
        .filter(|&&r| match bias {
            Bias::Long => r > threshold,
            Bias::Short => r < -threshold,
        })
        .count();
    hits as f64 / returns.len() as f64
}

/// PSU at every standard horizon, indexed like [`Horizon::ALL`].
pub fn signal_accuracy(rows: &[&LabeledRow], bias: Bias, threshold: f64) -> [f64; 4] {
    let mut out = [0.0; 4];
    for horizon in Horizon::ALL {
        let returns: Vec<f64> = rows.iter().map(|r| r.fwd_ret(horizon)).collect();
        out[horizon.index()] = hit_rate(&returns, bias, threshold);
    }
    out
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::test_support::row;

    // ── Profit factor ──

    #[test]
    fn profit_factor_known() {
        let pf = profit_factor(&[0.05, -0.02, 0.03, -0.02]);
        assert!((pf - 2.0).abs() < 1e-10);
    }

    #[test]
    fn profit_factor_no_losses_is_infinite() {
        assert_eq!(profit_factor(&[0.01, 0.02]), f64::INFINITY);
    }

    #[test]
    fn profit_factor_empty_and_flat() {
        assert_eq!(profit_factor(&[]), 0.0);
        assert_eq!(profit_factor(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn profit_factor_all_losses_is_zero() {
        assert_eq!(profit_factor(&[-0.01, -0.02]), 0.0);
    }

    // ── Max drawdown ──

    #[test]
    fn max_drawdown_known() {
        // 1.10 → 0.88 → 0.924; peak 1.10, trough 0.88 → 20%
        let dd = max_drawdown(&[0.10, -0.20, 0.05]);
        assert!((dd - 0.20).abs() < 1e-10);
    }

    #[test]
    fn max_drawdown_is_order_dependent() {
        let a = max_drawdown(&[0.10, -0.10, 0.10, -0.10]);
        let b = max_drawdown(&[-0.10, -0.10, 0.10, 0.10]);
        assert!((a - b).abs() > 1e-6);
    }

    #[test]
    fn max_drawdown_monotonic_is_zero() {
        assert_eq!(max_drawdown(&[0.01, 0.02, 0.03]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn max_drawdown_total_loss_is_one() {
        let dd = max_drawdown(&[0.1, -1.0]);
        assert!((dd - 1.0).abs() < 1e-12);
    }

    // ── Win rate / Sharpe ──

    #[test]
    fn win_rate_mixed() {
        assert!((win_rate(&[0.01, -0.01, 0.0, 0.02]) - 0.5).abs() < 1e-12);
        assert_eq!(win_rate(&[]), 0.0);
    }

    #[test]
    fn sharpe_degenerate_cases() {
        assert_eq!(sharpe_ratio(&[], RISK_FREE_RATE), 0.0);
        assert_eq!(sharpe_ratio(&[0.05], RISK_FREE_RATE), 0.0);
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], RISK_FREE_RATE), 0.0);
    }

    #[test]
    fn sharpe_known() {
        let r = [0.01, 0.03];
        // mean excess = 0.02 - 0.02/252, sample std = sqrt(2)*0.01
        let expected = 252f64.sqrt() * (0.02 - 0.02 / 252.0) / (2f64.sqrt() * 0.01);
        assert!((sharpe_ratio(&r, 0.02) - expected).abs() < 1e-9);
    }

    // ── Hit rate ──

    #[test]
    fn hit_rate_long_and_short() {
        let r = [0.05, 0.01, -0.03, -0.01];
        assert!((hit_rate(&r, Bias::Long, 0.02) - 0.25).abs() < 1e-12);
        assert!((hit_rate(&r, Bias::Short, 0.02) - 0.25).abs() < 1e-12);
        assert_eq!(hit_rate(&[], Bias::Long, 0.02), 0.0);
    }

    // ── Aggregate report ──

    #[test]
    fn report_empty_subset_is_all_zero() {
        let rows = vec![row(1, SignalType::Sell, 40.0, 0.05)];
        let report = calculate_all_metrics(&rows, SignalType::Buy, DEFAULT_HIT_THRESHOLD);
        assert_eq!(report, MetricsReport::empty());
        assert!(report.entries().iter().all(|(_, v)| *v == 0.0));
    }

    #[test]
    fn report_uses_only_requested_type() {
        let rows = vec![
            row(1, SignalType::Buy, 65.0, 0.05),
            row(2, SignalType::Buy, 65.0, -0.01),
            row(3, SignalType::Sell, 35.0, -0.20),
        ];
        let report = calculate_all_metrics(&rows, SignalType::Buy, DEFAULT_HIT_THRESHOLD);
        assert_eq!(report.total_trades, 2);
        assert!((report.pf - 5.0).abs() < 1e-10);
        assert!((report.win_rate - 0.5).abs() < 1e-12);
        assert!((report.psu_10 - 0.5).abs() < 1e-12);
        assert!((report.avg_ret - 0.02).abs() < 1e-12);
    }

    #[test]
    fn report_sell_counts_downside_hits() {
        let rows = vec![
            row(1, SignalType::Sell, 35.0, -0.05),
            row(2, SignalType::Sell, 35.0, 0.01),
        ];
        let report = calculate_all_metrics(&rows, SignalType::Sell, DEFAULT_HIT_THRESHOLD);
        assert!((report.psu_10 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn report_with_infinite_pf_serializes() {
        let rows = vec![row(1, SignalType::Buy, 65.0, 0.05)];
        let report = calculate_all_metrics(&rows, SignalType::Buy, DEFAULT_HIT_THRESHOLD);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""pf":"inf""#));
        let back: MetricsReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
