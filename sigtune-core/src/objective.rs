//! Objective function — one scalar per parameter vector, higher is better.
//!
//! score = w_pf·pf + w_dd·(1 − mdd) + w_hit·psu_10 + w_win·win_rate
//!
//! A vector that leaves fewer than `min_rows` training rows scores exactly 0.0.
//! Profit factor may be `+inf`, in which case so is the score; a zero weight
//! drops its term entirely so `0·inf` never turns into NaN.

use crate::domain::{ParamVector, SignalType};
use crate::filter::{simulate_filter, MIN_VIABLE_ROWS};
use crate::metrics::{calculate_all_metrics, MetricsReport, DEFAULT_HIT_THRESHOLD};
use crate::view::LabeledRow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectiveError {
    #[error("objective weight '{name}' must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("objective produced NaN for params [{params}]")]
    NanScore { params: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    pub profit_factor: f64,
    pub drawdown: f64,
    pub hit_rate: f64,
    pub win_rate: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            profit_factor: 0.4,
            drawdown: 0.2,
            hit_rate: 0.3,
            win_rate: 0.1,
        }
    }
}

impl ObjectiveWeights {
    pub fn validate(&self) -> Result<(), ObjectiveError> {
        for (name, value) in [
            ("profit_factor", self.profit_factor),
            ("drawdown", self.drawdown),
            ("hit_rate", self.hit_rate),
            ("win_rate", self.win_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ObjectiveError::InvalidWeight { name, value });
            }
        }
        Ok(())
    }

    /// Weighted sum over a metrics report.
    pub fn combine(&self, m: &MetricsReport) -> f64 {
        [
            (self.profit_factor, m.pf),
            (self.drawdown, 1.0 - m.mdd),
            (self.hit_rate, m.psu_10),
            (self.win_rate, m.win_rate),
        ]
        .iter()
        .filter(|(w, _)| *w != 0.0)
        .map(|(w, v)| w * v)
        .sum()
    }
}

/// Result of scoring one parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialEvaluation {
    pub score: f64,
    /// Rows that survived the filter.
    pub n_rows: usize,
    /// `None` when the trial fell under the row floor.
    pub metrics: Option<MetricsReport>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Objective {
    pub signal_type: SignalType,
    pub weights: ObjectiveWeights,
    pub min_rows: usize,
    pub hit_threshold: f64,
}

impl Objective {
    pub fn new(signal_type: SignalType) -> Self {
        Self {
            signal_type,
            weights: ObjectiveWeights::default(),
            min_rows: MIN_VIABLE_ROWS,
            hit_threshold: DEFAULT_HIT_THRESHOLD,
        }
    }

    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Score `params` against `rows` (the training split).
    ///
    /// Errors only on a NaN score; the caller treats that as fatal for the run.
    pub fn evaluate(
        &self,
        rows: &[LabeledRow],
        params: &ParamVector,
    ) -> Result<TrialEvaluation, ObjectiveError> {
        let kept = simulate_filter(rows, self.signal_type, params);
        if kept.len() < self.min_rows {
            return Ok(TrialEvaluation { score: 0.0, n_rows: kept.len(), metrics: None });
        }

        let metrics =
            calculate_all_metrics(kept.iter().copied(), self.signal_type, self.hit_threshold);
        let score = self.weights.combine(&metrics);
        if score.is_nan() {
            return Err(ObjectiveError::NanScore { params: params.to_string() });
        }
        Ok(TrialEvaluation { score, n_rows: kept.len(), metrics: Some(metrics) })
    }

    /// Metrics for `params` on `rows` with no row floor; used for held-out
    /// reporting.
    pub fn report(&self, rows: &[LabeledRow], params: &ParamVector) -> MetricsReport {
        let kept = simulate_filter(rows, self.signal_type, params);
        calculate_all_metrics(kept.iter().copied(), self.signal_type, self.hit_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RSI_BUY_TH;
    use crate::view::test_support::row;

    fn buys(n: u64, fwd_ret: impl Fn(u64) -> f64) -> Vec<LabeledRow> {
        (0..n).map(|i| row(i, SignalType::Buy, 65.0, fwd_ret(i))).collect()
    }

    #[test]
    fn below_row_floor_scores_zero() {
        let rows = buys(9, |_| 0.05);
        let eval = Objective::new(SignalType::Buy).evaluate(&rows, &ParamVector::new()).unwrap();
        assert_eq!(eval.score, 0.0);
        assert_eq!(eval.n_rows, 9);
        assert!(eval.metrics.is_none());
    }

    #[test]
    fn known_score() {
        // 8 wins of +3%, 2 losses of -2%: pf = 0.24/0.04 = 6
        let rows = buys(10, |i| if i % 5 == 4 { -0.02 } else { 0.03 });
        let eval = Objective::new(SignalType::Buy).evaluate(&rows, &ParamVector::new()).unwrap();
        let m = eval.metrics.unwrap();
        assert!((m.pf - 6.0).abs() < 1e-9);
        let expected = 0.4 * m.pf + 0.2 * (1.0 - m.mdd) + 0.3 * m.psu_10 + 0.1 * m.win_rate;
        assert!((eval.score - expected).abs() < 1e-12);
    }

    #[test]
    fn all_winners_score_infinite() {
        let rows = buys(12, |_| 0.05);
        let eval = Objective::new(SignalType::Buy).evaluate(&rows, &ParamVector::new()).unwrap();
        assert_eq!(eval.score, f64::INFINITY);
    }

    #[test]
    fn zero_weight_on_infinite_pf_stays_finite() {
        let rows = buys(12, |_| 0.05);
        let weights = ObjectiveWeights { profit_factor: 0.0, ..ObjectiveWeights::default() };
        let eval = Objective::new(SignalType::Buy)
            .with_weights(weights)
            .evaluate(&rows, &ParamVector::new())
            .unwrap();
        assert!(eval.score.is_finite());
        assert!((eval.score - (0.2 + 0.3 + 0.1)).abs() < 1e-12);
    }

    #[test]
    fn nan_returns_are_fatal() {
        // +inf gains against -inf losses: pf = inf/inf
        let rows = buys(12, |i| match i {
            0 => f64::INFINITY,
            1 => f64::NEG_INFINITY,
            _ => 0.01,
        });
        let err = Objective::new(SignalType::Buy)
            .evaluate(&rows, &ParamVector::new())
            .unwrap_err();
        assert!(matches!(err, ObjectiveError::NanScore { .. }));
    }

    #[test]
    fn restrictive_params_hit_the_floor() {
        let rows = buys(30, |_| 0.05);
        let params = ParamVector::new().with(RSI_BUY_TH, 70.0);
        let eval = Objective::new(SignalType::Buy).evaluate(&rows, &params).unwrap();
        assert_eq!(eval.score, 0.0);
        assert_eq!(eval.n_rows, 0);
    }

    #[test]
    fn negative_weight_rejected() {
        let w = ObjectiveWeights { win_rate: -0.1, ..ObjectiveWeights::default() };
        assert!(w.validate().is_err());
        assert!(ObjectiveWeights::default().validate().is_ok());
    }
}
