//! Ablation analysis — how much each emission-time feature moves BUY
//! performance.
//!
//! Both analyses slice the already-labeled BUY rows; nothing is re-simulated.
//! Features are read through [`FeatureSet::numeric`].

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use sigtune_core::domain::{FeatureSet, SignalType};
use sigtune_core::metrics::{
    calculate_all_metrics, mean_f64, std_dev, MetricsReport, DEFAULT_HIT_THRESHOLD,
};
use sigtune_core::view::{LabeledRow, LabeledTable};

/// Quantile buckets smaller than this are left out of the breakdown.
pub const MIN_BUCKET_ROWS: usize = 5;

/// Ablated subsets smaller than this fall back to every BUY row.
pub const MIN_ABLATED_ROWS: usize = 10;

/// Half-width of the "neutral" band around the median, in standard deviations.
pub const NEUTRAL_BAND_SIGMAS: f64 = 0.2;

/// Features analysed when none are named.
pub const DEFAULT_FEATURES: [&str; 6] =
    ["trend_score", "prob", "rsi", "vol_mult", "vcp_ratio", "dist_ath"];

#[derive(Debug, Error, PartialEq)]
pub enum AblationError {
    #[error("no labeled signals available")]
    NoData,
    #[error("unknown feature '{0}'")]
    UnknownFeature(String),
    #[error("quantiles must be at least 1")]
    NoQuantiles,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantileBucket {
    pub quantile: usize,
    pub low: f64,
    pub high: f64,
    pub count: usize,
    pub pf: f64,
    pub mdd: f64,
    pub win_rate: f64,
    pub avg_ret: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImpact {
    pub feature: String,
    pub baseline: MetricsReport,
    pub buckets: Vec<QuantileBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AblationRow {
    pub feature: String,
    pub baseline_pf: f64,
    pub ablated_pf: f64,
    pub baseline_win_rate: f64,
    pub ablated_win_rate: f64,
    /// Baseline minus ablated composite score; positive means the feature helps.
    pub impact: f64,
    pub importance: f64,
    pub rows_kept: usize,
    pub fell_back: bool,
}

/// `0.3·pf + 0.2·(1−mdd) + 0.25·win_rate + 0.25·psu_10`
pub fn composite_score(m: &MetricsReport) -> f64 {
    0.3 * m.pf + 0.2 * (1.0 - m.mdd) + 0.25 * m.win_rate + 0.25 * m.psu_10
}

fn check_feature(name: &str) -> Result<(), AblationError> {
    match FeatureSet::default().numeric(name) {
        Some(_) => Ok(()),
        None => Err(AblationError::UnknownFeature(name.to_string())),
    }
}

fn value(row: &LabeledRow, feature: &str) -> f64 {
    row.features.numeric(feature).unwrap_or(f64::NAN)
}

fn buy_metrics<'a>(rows: impl IntoIterator<Item = &'a LabeledRow>) -> MetricsReport {
    calculate_all_metrics(rows, SignalType::Buy, DEFAULT_HIT_THRESHOLD)
}

pub struct AblationAnalyzer {
    table: LabeledTable,
    baseline: MetricsReport,
}

impl AblationAnalyzer {
    pub fn new(table: LabeledTable) -> Result<Self, AblationError> {
        if table.is_empty() {
            return Err(AblationError::NoData);
        }
        let baseline = buy_metrics(table.rows());
        Ok(Self { table, baseline })
    }

    pub fn baseline(&self) -> &MetricsReport {
        &self.baseline
    }

    /// BUY performance per rank quantile of `feature`.
    ///
    /// Rows are ordered by feature value (ties keep table order) and row `i`
    /// of `n` lands in quantile `i * quantiles / n`.
    pub fn feature_impact(
        &self,
        feature: &str,
        quantiles: usize,
    ) -> Result<FeatureImpact, AblationError> {
        check_feature(feature)?;
        if quantiles == 0 {
            return Err(AblationError::NoQuantiles);
        }

        let mut buys: Vec<&LabeledRow> = self
            .table
            .rows()
            .iter()
            .filter(|r| r.signal_type == SignalType::Buy)
            .collect();
        buys.sort_by(|a, b| value(a, feature).total_cmp(&value(b, feature)));

        let n = buys.len();
        let mut buckets = Vec::new();
        for q in 0..quantiles {
            let subset: Vec<&LabeledRow> = buys
                .iter()
                .enumerate()
                .filter(|(i, _)| i * quantiles / n.max(1) == q)
                .map(|(_, r)| *r)
                .collect();
            if subset.len() < MIN_BUCKET_ROWS {
                continue;
            }
            let m = buy_metrics(subset.iter().copied());
            buckets.push(QuantileBucket {
                quantile: q,
                low: value(subset[0], feature),
                high: value(subset[subset.len() - 1], feature),
                count: subset.len(),
                pf: m.pf,
                mdd: m.mdd,
                win_rate: m.win_rate,
                avg_ret: m.avg_ret,
            });
        }

        Ok(FeatureImpact {
            feature: feature.to_string(),
            baseline: self.baseline,
            buckets,
        })
    }

    /// Keep only BUY rows whose `feature` sits near its median and measure how
    /// far the composite score drops. Sorted by importance, largest first.
    pub fn ablation_study(&self, features: &[&str]) -> Result<Vec<AblationRow>, AblationError> {
        for f in features {
            check_feature(f)?;
        }
        let baseline_score = composite_score(&self.baseline);

        let mut rows: Vec<AblationRow> = features
            .par_iter()
            .map(|feature| {
                let (kept, fell_back) = self.neutral_buys(feature);
                let ablated = buy_metrics(kept.iter().copied());
                let impact = baseline_score - composite_score(&ablated);
                AblationRow {
                    feature: feature.to_string(),
                    baseline_pf: self.baseline.pf,
                    ablated_pf: ablated.pf,
                    baseline_win_rate: self.baseline.win_rate,
                    ablated_win_rate: ablated.win_rate,
                    impact,
                    importance: impact.abs(),
                    rows_kept: kept.len(),
                    fell_back,
                }
            })
            .collect();

        rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        Ok(rows)
    }

    /// BUY rows within the neutral band of `feature`, or all BUY rows when
    /// the band holds fewer than [`MIN_ABLATED_ROWS`]. Median and spread are
    /// taken over every signal type.
    fn neutral_buys(&self, feature: &str) -> (Vec<&LabeledRow>, bool) {
        let all = self.table.rows();
        let mut values: Vec<f64> = all.iter().map(|r| value(r, feature)).collect();
        let tolerance = std_dev(&values) * NEUTRAL_BAND_SIGMAS;
        values.sort_by(f64::total_cmp);
        let median = median_sorted(&values);

        let buys = all.iter().filter(|r| r.signal_type == SignalType::Buy);
        let kept: Vec<&LabeledRow> = buys
            .clone()
            .filter(|r| (value(r, feature) - median).abs() < tolerance)
            .collect();
        if kept.len() < MIN_ABLATED_ROWS {
            (buys.collect(), true)
        } else {
            (kept, false)
        }
    }
}

fn median_sorted(values: &[f64]) -> f64 {
    let n = values.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => values[n / 2],
        _ => mean_f64(&values[n / 2 - 1..=n / 2]),
    }
}
