//! Property tests for metric and view invariants.
//!
//! Uses proptest to verify:
//! 1. Profit factor — infinite on all-positive returns
//! 2. Drawdown bounds — within [0, 1] for returns bounded below by −1
//! 3. Filter monotonicity — raising the buy RSI threshold never admits more rows
//! 4. Walk-forward ordering — every training row precedes every test row
//! 5. Objective floor — undersized samples score exactly 0.0

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use sigtune_core::domain::{EmittedParams, FeatureSet, SignalType};
use sigtune_core::filter::{simulate_filter, RSI_BUY_TH};
use sigtune_core::metrics::{max_drawdown, profit_factor, sharpe_ratio, win_rate};
use sigtune_core::view::HorizonOutcome;
use sigtune_core::{LabeledRow, LabeledTable, Objective, ParamVector};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_return() -> impl Strategy<Value = f64> {
    -1.0..1.0_f64
}

fn make_row(id: u64, hour_offset: i64, rsi: f64, fwd_ret: f64) -> LabeledRow {
    let outcome = HorizonOutcome { fwd_ret, broke_high: false, broke_low: false };
    LabeledRow {
        signal_id: id,
        ts: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour_offset),
        symbol: "BTCUSDT".into(),
        timeframe: "1h".into(),
        signal_type: SignalType::Buy,
        features: FeatureSet { rsi, ..FeatureSet::default() },
        params: EmittedParams::default(),
        outcomes: [outcome; 4],
    }
}

fn arb_rows(max: usize) -> impl Strategy<Value = Vec<LabeledRow>> {
    prop::collection::vec((0..500_i64, 20.0..90.0_f64, arb_return()), 0..max).prop_map(|v| {
        v.into_iter()
            .enumerate()
            .map(|(i, (hour, rsi, ret))| make_row(i as u64, hour, rsi, ret))
            .collect()
    })
}

// ── 1. Profit factor ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn all_positive_returns_give_infinite_pf(
        returns in prop::collection::vec(0.0001..1.0_f64, 1..50),
    ) {
        prop_assert_eq!(profit_factor(&returns), f64::INFINITY);
    }

    #[test]
    fn profit_factor_is_never_negative(returns in prop::collection::vec(arb_return(), 0..50)) {
        prop_assert!(profit_factor(&returns) >= 0.0);
    }
}

// ── 2. Drawdown bounds ───────────────────────────────────────────────

proptest! {
    #[test]
    fn drawdown_within_unit_interval(returns in prop::collection::vec(arb_return(), 0..100)) {
        let dd = max_drawdown(&returns);
        prop_assert!((0.0..=1.0).contains(&dd), "dd = {}", dd);
    }

    #[test]
    fn win_rate_within_unit_interval(returns in prop::collection::vec(arb_return(), 0..100)) {
        let wr = win_rate(&returns);
        prop_assert!((0.0..=1.0).contains(&wr));
    }

    #[test]
    fn sharpe_is_finite(returns in prop::collection::vec(arb_return(), 0..100)) {
        prop_assert!(sharpe_ratio(&returns, 0.02).is_finite());
    }
}

// ── 3. Filter monotonicity ───────────────────────────────────────────

proptest! {
    #[test]
    fn raising_buy_threshold_never_admits_more(
        rows in arb_rows(60),
        low in 40.0..80.0_f64,
        bump in 0.0..20.0_f64,
    ) {
        let loose = ParamVector::new().with(RSI_BUY_TH, low);
        let tight = ParamVector::new().with(RSI_BUY_TH, low + bump);
        let n_loose = simulate_filter(&rows, SignalType::Buy, &loose).len();
        let n_tight = simulate_filter(&rows, SignalType::Buy, &tight).len();
        prop_assert!(n_tight <= n_loose);
    }
}

// ── 4. Walk-forward ordering ─────────────────────────────────────────

proptest! {
    #[test]
    fn train_precedes_test(rows in arb_rows(80), ratio in 0.0..=1.0_f64) {
        let n = rows.len();
        let (train, test) = LabeledTable::new(rows).split_walk_forward(ratio).unwrap();
        prop_assert_eq!(train.len() + test.len(), n);
        prop_assert_eq!(train.len(), ((n as f64) * ratio).floor() as usize);
        if let (Some(max_train), Some(min_test)) = (
            train.rows().iter().map(|r| r.ts).max(),
            test.rows().iter().map(|r| r.ts).min(),
        ) {
            prop_assert!(max_train <= min_test);
        }
    }
}

// ── 5. Objective floor ───────────────────────────────────────────────

proptest! {
    #[test]
    fn fewer_than_ten_rows_score_zero(rows in arb_rows(10)) {
        let eval = Objective::new(SignalType::Buy)
            .evaluate(&rows, &ParamVector::new())
            .unwrap();
        prop_assert_eq!(eval.score, 0.0);
    }
}
