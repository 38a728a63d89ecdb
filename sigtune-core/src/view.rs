//! Labeled-data view — signals joined with their per-horizon labels.
//!
//! One row per usable signal. The table is loaded once per tuning run and only
//! read afterwards; splitting and filtering produce new tables.

use crate::domain::{
    DatasetHash, EmittedParams, FeatureSet, Horizon, Label, Signal, SignalType,
};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default minimum label count: all four standard horizons.
pub const DEFAULT_MIN_LABELS: usize = 4;

/// Default walk-forward training fraction.
pub const DEFAULT_TRAIN_RATIO: f64 = 0.7;

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("train ratio must be within [0, 1], got {0}")]
    InvalidTrainRatio(f64),

    #[error("dataframe: {0}")]
    DataFrame(#[from] PolarsError),
}

/// Realized outcome at one horizon. A missing label reads as zero return and
/// no breakouts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HorizonOutcome {
    pub fwd_ret: f64,
    pub broke_high: bool,
    pub broke_low: bool,
}

impl From<&Label> for HorizonOutcome {
    fn from(label: &Label) -> Self {
        Self {
            fwd_ret: label.fwd_ret,
            broke_high: label.broke_high,
            broke_low: label.broke_low,
        }
    }
}

/// A signal flattened together with its outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub signal_id: u64,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: String,
    pub signal_type: SignalType,
    pub features: FeatureSet,
    pub params: EmittedParams,
    /// Indexed like [`Horizon::ALL`].
    pub outcomes: [HorizonOutcome; 4],
}

impl LabeledRow {
    pub fn outcome(&self, horizon: Horizon) -> &HorizonOutcome {
        &self.outcomes[horizon.index()]
    }

    pub fn fwd_ret(&self, horizon: Horizon) -> f64 {
        self.outcome(horizon).fwd_ret
    }
}

/// Summary counts and means over a table.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalStats {
    pub total_signals: usize,
    pub buy_signals: usize,
    pub sell_signals: usize,
    pub avg_trend_score: f64,
    pub avg_prob: f64,
    pub avg_rsi: f64,
    pub avg_fwd_ret_10: f64,
    pub win_rate_10: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledTable {
    rows: Vec<LabeledRow>,
}

impl LabeledTable {
    pub fn new(rows: Vec<LabeledRow>) -> Self {
        Self { rows }
    }

    /// Join signals with labels, keeping only signals that have labels for at
    /// least `min_labels` distinct horizons. Row order follows `signals`.
    pub fn from_signals(signals: &[Signal], labels: &[Label], min_labels: usize) -> Self {
        let mut by_signal: HashMap<u64, [Option<HorizonOutcome>; 4]> = HashMap::new();
        for label in labels {
            let slots = by_signal.entry(label.signal_id).or_insert([None; 4]);
            slots[label.horizon.index()] = Some(HorizonOutcome::from(label));
        }

        let rows = signals
            .iter()
            .filter_map(|signal| {
                let slots = by_signal.get(&signal.id).copied().unwrap_or([None; 4]);
                let present = slots.iter().filter(|s| s.is_some()).count();
                if present < min_labels {
                    return None;
                }
                Some(LabeledRow {
                    signal_id: signal.id,
                    ts: signal.ts,
                    symbol: signal.symbol.clone(),
                    timeframe: signal.timeframe.clone(),
                    signal_type: signal.signal_type,
                    features: signal.features.clone(),
                    params: signal.params.clone(),
                    outcomes: slots.map(Option::unwrap_or_default),
                })
            })
            .collect();

        Self { rows }
    }

    pub fn rows(&self) -> &[LabeledRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<LabeledRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Chronological train/test split.
    ///
    /// Rows are stable-sorted by timestamp and cut at `floor(len * train_ratio)`,
    /// so every training row is no later than any test row.
    pub fn split_walk_forward(
        &self,
        train_ratio: f64,
    ) -> Result<(LabeledTable, LabeledTable), ViewError> {
        if !(0.0..=1.0).contains(&train_ratio) {
            return Err(ViewError::InvalidTrainRatio(train_ratio));
        }
        let mut sorted = self.rows.clone();
        sorted.sort_by_key(|r| r.ts);

        let split_idx = ((sorted.len() as f64) * train_ratio).floor() as usize;
        let test = sorted.split_off(split_idx.min(sorted.len()));
        Ok((LabeledTable::new(sorted), LabeledTable::new(test)))
    }

    pub fn filter_by_type(&self, signal_type: SignalType) -> LabeledTable {
        LabeledTable::new(
            self.rows
                .iter()
                .filter(|r| r.signal_type == signal_type)
                .cloned()
                .collect(),
        )
    }

    pub fn stats(&self) -> SignalStats {
        let n = self.rows.len();
        if n == 0 {
            return SignalStats::default();
        }
        let mean = |f: &dyn Fn(&LabeledRow) -> f64| self.rows.iter().map(f).sum::<f64>() / n as f64;
        SignalStats {
            total_signals: n,
            buy_signals: self.count_type(SignalType::Buy),
            sell_signals: self.count_type(SignalType::Sell),
            avg_trend_score: mean(&|r| r.features.trend_score),
            avg_prob: mean(&|r| r.features.prob),
            avg_rsi: mean(&|r| r.features.rsi),
            avg_fwd_ret_10: mean(&|r| r.fwd_ret(Horizon::H10)),
            win_rate_10: mean(&|r| f64::from(u8::from(r.fwd_ret(Horizon::H10) > 0.0))),
        }
    }

    fn count_type(&self, signal_type: SignalType) -> usize {
        self.rows.iter().filter(|r| r.signal_type == signal_type).count()
    }

    /// BLAKE3 content hash of the rows in their current order.
    pub fn dataset_hash(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        for row in &self.rows {
            // LabeledRow holds only plain data; serialization cannot fail.
            if let Ok(bytes) = serde_json::to_vec(row) {
                hasher.update(&bytes);
            }
            hasher.update(b"\n");
        }
        DatasetHash(hasher.finalize().to_hex().to_string())
    }

    /// Flatten into a Polars DataFrame, one column per field.
    pub fn to_dataframe(&self) -> Result<DataFrame, ViewError> {
        let rows = &self.rows;
        let f64_col = |name: &str, f: &dyn Fn(&LabeledRow) -> f64| {
            Column::new(name.into(), rows.iter().map(f).collect::<Vec<f64>>())
        };
        let bool_col = |name: &str, f: &dyn Fn(&LabeledRow) -> bool| {
            Column::new(name.into(), rows.iter().map(f).collect::<Vec<bool>>())
        };

        let mut columns = vec![
            Column::new(
                "signal_id".into(),
                rows.iter().map(|r| r.signal_id).collect::<Vec<u64>>(),
            ),
            Column::new(
                "ts".into(),
                rows.iter().map(|r| r.ts.timestamp_millis()).collect::<Vec<i64>>(),
            )
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
            Column::new(
                "symbol".into(),
                rows.iter().map(|r| r.symbol.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                "tf".into(),
                rows.iter().map(|r| r.timeframe.clone()).collect::<Vec<String>>(),
            ),
            Column::new(
                "signal".into(),
                rows.iter()
                    .map(|r| r.signal_type.as_str().to_string())
                    .collect::<Vec<String>>(),
            ),
            f64_col("trend_score", &|r| r.features.trend_score),
            f64_col("prob", &|r| r.features.prob),
            bool_col("ema20_above_50", &|r| r.features.ema20_above_50),
            f64_col("rsi", &|r| r.features.rsi),
            f64_col("vol_mult", &|r| r.features.vol_mult),
            f64_col("vcp_ratio", &|r| r.features.vcp_ratio),
            f64_col("dist_ath", &|r| r.features.dist_ath),
            f64_col("vix", &|r| r.features.macro_ctx.vix),
            f64_col("alpha", &|r| r.params.alpha),
            f64_col("beta", &|r| r.params.beta),
            f64_col("gamma", &|r| r.params.gamma),
            f64_col("delta", &|r| r.params.delta),
            f64_col("epsilon", &|r| r.params.epsilon),
        ];
        for horizon in Horizon::ALL {
            let n = horizon.bars();
            columns.push(f64_col(&format!("fwd_ret_{n}"), &|r| r.fwd_ret(horizon)));
            columns.push(bool_col(&format!("broke_high_{n}"), &|r| {
                r.outcome(horizon).broke_high
            }));
            columns.push(bool_col(&format!("broke_low_{n}"), &|r| {
                r.outcome(horizon).broke_low
            }));
        }

        Ok(DataFrame::new(columns)?)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::row;
    use super::*;
    use chrono::TimeZone;

    fn signal(id: u64, hour: u32) -> Signal {
        Signal {
            id,
            ts: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            symbol: "ETHUSDT".into(),
            timeframe: "1h".into(),
            signal_type: SignalType::Buy,
            features: FeatureSet::default(),
            params: EmittedParams::default(),
            bar: None,
        }
    }

    fn label(signal_id: u64, horizon: Horizon, fwd_ret: f64) -> Label {
        Label { signal_id, horizon, fwd_ret, broke_high: fwd_ret > 0.03, broke_low: false }
    }

    #[test]
    fn join_skips_signals_below_min_labels() {
        let signals = vec![signal(1, 1), signal(2, 2)];
        let mut labels: Vec<Label> =
            Horizon::ALL.iter().map(|&h| label(1, h, 0.01)).collect();
        labels.push(label(2, Horizon::H3, 0.02));

        let table = LabeledTable::from_signals(&signals, &labels, DEFAULT_MIN_LABELS);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].signal_id, 1);

        let relaxed = LabeledTable::from_signals(&signals, &labels, 1);
        assert_eq!(relaxed.len(), 2);
        // Missing horizons read as zero.
        assert_eq!(relaxed.rows()[1].fwd_ret(Horizon::H10), 0.0);
        assert_eq!(relaxed.rows()[1].fwd_ret(Horizon::H3), 0.02);
    }

    #[test]
    fn split_is_chronological() {
        let rows: Vec<LabeledRow> =
            (0..100).rev().map(|i| row(i, SignalType::Buy, 50.0, 0.0)).collect();
        let (train, test) = LabeledTable::new(rows).split_walk_forward(0.7).unwrap();
        assert_eq!(train.len(), 70);
        assert_eq!(test.len(), 30);
        let max_train = train.rows().iter().map(|r| r.ts).max().unwrap();
        let min_test = test.rows().iter().map(|r| r.ts).min().unwrap();
        assert!(max_train <= min_test);
    }

    #[test]
    fn split_rejects_bad_ratio() {
        let table = LabeledTable::new(vec![row(1, SignalType::Buy, 50.0, 0.0)]);
        assert!(matches!(
            table.split_walk_forward(1.5),
            Err(ViewError::InvalidTrainRatio(_))
        ));
    }

    #[test]
    fn split_of_empty_table() {
        let (train, test) = LabeledTable::default().split_walk_forward(0.7).unwrap();
        assert!(train.is_empty() && test.is_empty());
    }

    #[test]
    fn stats_counts_and_means() {
        let table = LabeledTable::new(vec![
            row(1, SignalType::Buy, 60.0, 0.04),
            row(2, SignalType::Sell, 40.0, -0.02),
            row(3, SignalType::WatchUp, 50.0, 0.01),
        ]);
        let stats = table.stats();
        assert_eq!(stats.total_signals, 3);
        assert_eq!(stats.buy_signals, 1);
        assert_eq!(stats.sell_signals, 1);
        assert!((stats.avg_rsi - 50.0).abs() < 1e-12);
        assert!((stats.avg_fwd_ret_10 - 0.01).abs() < 1e-12);
        assert!((stats.win_rate_10 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn dataset_hash_tracks_content() {
        let a = LabeledTable::new(vec![row(1, SignalType::Buy, 60.0, 0.04)]);
        let b = LabeledTable::new(vec![row(1, SignalType::Buy, 61.0, 0.04)]);
        assert_eq!(a.dataset_hash(), a.clone().dataset_hash());
        assert_ne!(a.dataset_hash(), b.dataset_hash());
    }

    #[test]
    fn dataframe_has_one_row_per_signal() {
        let table = LabeledTable::new(vec![
            row(1, SignalType::Buy, 60.0, 0.04),
            row(2, SignalType::Sell, 40.0, -0.02),
        ]);
        let df = table.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert!(df.column("fwd_ret_10").is_ok());
        assert!(df.column("broke_low_20").is_ok());
    }
}
