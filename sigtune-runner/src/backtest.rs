//! Simple compounding backtest over labeled signals.
//!
//! Each signal of the chosen type is one trade held for 10 bars; capital
//! compounds through the trades in timestamp order. No costs, no sizing.

use serde::{Deserialize, Serialize};

use sigtune_core::domain::{Horizon, ParamVector, SignalType};
use sigtune_core::filter::simulate_filter;
use sigtune_core::metrics::{
    max_drawdown, mean_f64, profit_factor, sharpe_ratio, win_rate, RISK_FREE_RATE,
};
use sigtune_core::serde_ext::extended_f64;
use sigtune_core::view::LabeledRow;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_return: f64,
    pub num_trades: usize,
    #[serde(with = "extended_f64")]
    pub pf: f64,
    pub mdd: f64,
    pub win_rate: f64,
    pub sharpe: f64,
    pub avg_ret: f64,
    /// Capital after each trade.
    pub equity: Vec<f64>,
}

/// Compound every `signal_type` row's 10-bar return, oldest first.
pub fn run_backtest<'a>(
    rows: impl IntoIterator<Item = &'a LabeledRow>,
    signal_type: SignalType,
    initial_capital: f64,
) -> BacktestSummary {
    let mut trades: Vec<&LabeledRow> = rows
        .into_iter()
        .filter(|r| r.signal_type == signal_type)
        .collect();
    trades.sort_by_key(|r| r.ts);

    let returns: Vec<f64> = trades.iter().map(|r| r.fwd_ret(Horizon::H10)).collect();
    let equity: Vec<f64> = returns
        .iter()
        .scan(initial_capital, |capital, r| {
            *capital *= 1.0 + r;
            Some(*capital)
        })
        .collect();
    let final_capital = equity.last().copied().unwrap_or(initial_capital);

    BacktestSummary {
        initial_capital,
        final_capital,
        total_return: if initial_capital != 0.0 {
            (final_capital - initial_capital) / initial_capital
        } else {
            0.0
        },
        num_trades: returns.len(),
        pf: profit_factor(&returns),
        mdd: max_drawdown(&returns),
        win_rate: win_rate(&returns),
        sharpe: sharpe_ratio(&returns, RISK_FREE_RATE),
        avg_ret: mean_f64(&returns),
        equity,
    }
}

/// Backtest only the rows that `params` would have let through.
pub fn backtest_params(
    rows: &[LabeledRow],
    signal_type: SignalType,
    params: &ParamVector,
    initial_capital: f64,
) -> BacktestSummary {
    run_backtest(simulate_filter(rows, signal_type, params), signal_type, initial_capital)
}
