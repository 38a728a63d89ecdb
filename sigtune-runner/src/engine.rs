//! Parameter search engine — sequential model-based optimization loop.
//!
//! Each trial asks the sampler for a vector, scores it on the training rows,
//! and feeds the score back before the next proposal. Trials never run in
//! parallel: proposal `n` depends on every score before it.
//!
//! Stops on the first of: trial budget reached, wall-clock timeout, cancel
//! flag. Timeout and cancel are checked between trials, so the first trial
//! always runs and a stop lands within one trial of the deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use sigtune_core::domain::ParamVector;
use sigtune_core::objective::{Objective, ObjectiveError};
use sigtune_core::serde_ext::extended_f64;
use sigtune_core::view::LabeledRow;

use crate::sampler::{rank_scores, ParamSampler};
use crate::space::{SearchSpace, SpaceError};

// ─── Config types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub n_trials: usize,
    /// `None` runs until the trial budget is spent.
    pub timeout: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_trials: 100,
            timeout: Some(Duration::from_secs(3600)),
        }
    }
}

// ─── Progress & result types ─────────────────────────────────────────

/// One evaluated parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub number: usize,
    pub params: ParamVector,
    #[serde(with = "extended_f64")]
    pub score: f64,
    /// Training rows that survived the filter.
    pub n_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    TrialBudget,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProgress {
    pub trials_completed: usize,
    pub n_trials: usize,
    #[serde(with = "extended_f64")]
    pub best_score: f64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// In evaluation order; `trials[i].number == i`.
    pub trials: Vec<Trial>,
    best_index: usize,
    pub stop_reason: StopReason,
    pub elapsed_secs: f64,
}

impl SearchOutcome {
    /// Highest-scoring trial; the earliest one wins a tie.
    pub fn best(&self) -> &Trial {
        &self.trials[self.best_index]
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no labeled signals available; run the labeler first")]
    NoData,

    #[error("n_trials must be at least 1")]
    NoTrials,

    #[error("invalid search space: {0}")]
    Space(#[from] SpaceError),

    #[error("invalid objective: {0}")]
    Objective(ObjectiveError),

    #[error("trial {trial} failed: {source}")]
    TrialFailed {
        trial: usize,
        #[source]
        source: ObjectiveError,
    },
}

// ─── Core search loop ────────────────────────────────────────────────

/// Run the search over `train`.
///
/// # Arguments
/// - `config`: trial budget and timeout.
/// - `space`: validated before the first trial.
/// - `objective`: scores each proposal on `train`.
/// - `sampler`: proposal strategy; receives every score via `update`.
/// - `progress_cb`: optional callback after each trial (throttled to ~500ms).
/// - `cancel`: optional atomic flag to stop cooperatively between trials.
pub fn run_search(
    config: &SearchConfig,
    space: &SearchSpace,
    objective: &Objective,
    train: &[LabeledRow],
    sampler: &mut dyn ParamSampler,
    progress_cb: Option<&dyn Fn(&SearchProgress)>,
    cancel: Option<&AtomicBool>,
) -> Result<SearchOutcome, SearchError> {
    if train.is_empty() {
        return Err(SearchError::NoData);
    }
    if config.n_trials == 0 {
        return Err(SearchError::NoTrials);
    }
    space.validate()?;
    objective.weights.validate().map_err(SearchError::Objective)?;

    info!(
        sampler = sampler.name(),
        n_trials = config.n_trials,
        timeout = ?config.timeout,
        dims = space.len(),
        train_rows = train.len(),
        "starting search"
    );

    let start_time = Instant::now();
    let mut last_progress = Instant::now();
    let mut trials: Vec<Trial> = Vec::with_capacity(config.n_trials);
    let mut best_index = 0usize;
    let mut stop_reason = StopReason::TrialBudget;

    for number in 0..config.n_trials {
        if number > 0 {
            if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                stop_reason = StopReason::Cancelled;
                break;
            }
            if config.timeout.is_some_and(|t| start_time.elapsed() >= t) {
                stop_reason = StopReason::Timeout;
                break;
            }
        }

        let params = sampler.propose(space, number);
        let eval = objective
            .evaluate(train, &params)
            .map_err(|source| SearchError::TrialFailed { trial: number, source })?;
        sampler.update(&params, eval.score);

        debug!(trial = number, score = eval.score, rows = eval.n_rows, params = %params, "trial");

        trials.push(Trial {
            number,
            params,
            score: eval.score,
            n_rows: eval.n_rows,
        });

        if number > 0 && rank_scores(eval.score, trials[best_index].score).is_lt() {
            best_index = number;
            info!(trial = number, score = eval.score, "new best");
        }

        if let Some(cb) = progress_cb {
            if last_progress.elapsed().as_millis() >= 500 || number + 1 == config.n_trials {
                cb(&SearchProgress {
                    trials_completed: trials.len(),
                    n_trials: config.n_trials,
                    best_score: trials[best_index].score,
                    elapsed_secs: start_time.elapsed().as_secs_f64(),
                });
                last_progress = Instant::now();
            }
        }
    }

    let outcome = SearchOutcome {
        trials,
        best_index,
        stop_reason,
        elapsed_secs: start_time.elapsed().as_secs_f64(),
    };
    info!(
        trials = outcome.trials.len(),
        best_trial = outcome.best().number,
        best_score = outcome.best().score,
        stop = ?outcome.stop_reason,
        "search finished"
    );
    Ok(outcome)
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::RandomSampler;
    use crate::space::Dimension;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use sigtune_core::domain::{EmittedParams, FeatureSet, SignalType};
    use sigtune_core::view::HorizonOutcome;

    fn rows(n: usize) -> Vec<LabeledRow> {
        (0..n)
            .map(|i| {
                let outcome = HorizonOutcome { fwd_ret: 0.01, broke_high: false, broke_low: false };
                LabeledRow {
                    signal_id: i as u64,
                    ts: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                        + ChronoDuration::hours(i as i64),
                    symbol: "BTCUSDT".into(),
                    timeframe: "1h".into(),
                    signal_type: SignalType::Buy,
                    features: FeatureSet { rsi: 45.0, ..FeatureSet::default() },
                    params: EmittedParams::default(),
                    outcomes: [outcome; 4],
                }
            })
            .collect()
    }

    fn space() -> SearchSpace {
        SearchSpace::new(vec![Dimension::float("rsi_buy_th", 50.0, 70.0)])
    }

    #[test]
    fn all_zero_scores_pick_first_trial() {
        // Every row has RSI 45, below any threshold in [50, 70].
        let config = SearchConfig { n_trials: 8, timeout: None };
        let mut sampler = RandomSampler::new(1);
        let outcome = run_search(
            &config,
            &space(),
            &Objective::new(SignalType::Buy),
            &rows(30),
            &mut sampler,
            None,
            None,
        )
        .unwrap();
        assert_eq!(outcome.trials.len(), 8);
        assert!(outcome.trials.iter().all(|t| t.score == 0.0));
        assert_eq!(outcome.best().number, 0);
        assert_eq!(outcome.stop_reason, StopReason::TrialBudget);
    }

    #[test]
    fn empty_training_rows_fail_fast() {
        let mut sampler = RandomSampler::new(1);
        let err = run_search(
            &SearchConfig::default(),
            &space(),
            &Objective::new(SignalType::Buy),
            &[],
            &mut sampler,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::NoData));
    }

    #[test]
    fn cancel_stops_after_first_trial() {
        let cancel = AtomicBool::new(true);
        let mut sampler = RandomSampler::new(1);
        let outcome = run_search(
            &SearchConfig { n_trials: 50, timeout: None },
            &space(),
            &Objective::new(SignalType::Buy),
            &rows(20),
            &mut sampler,
            None,
            Some(&cancel),
        )
        .unwrap();
        assert_eq!(outcome.trials.len(), 1);
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    }

    #[test]
    fn zero_timeout_still_runs_one_trial() {
        let mut sampler = RandomSampler::new(1);
        let outcome = run_search(
            &SearchConfig { n_trials: 50, timeout: Some(Duration::ZERO) },
            &space(),
            &Objective::new(SignalType::Buy),
            &rows(20),
            &mut sampler,
            None,
            None,
        )
        .unwrap();
        assert_eq!(outcome.trials.len(), 1);
        assert_eq!(outcome.stop_reason, StopReason::Timeout);
    }

    #[test]
    fn zero_trials_rejected() {
        let mut sampler = RandomSampler::new(1);
        let err = run_search(
            &SearchConfig { n_trials: 0, timeout: None },
            &space(),
            &Objective::new(SignalType::Buy),
            &rows(20),
            &mut sampler,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SearchError::NoTrials));
    }

    #[test]
    fn progress_reported_on_last_trial() {
        use std::cell::Cell;
        let calls = Cell::new(0usize);
        let last = Cell::new(0usize);
        let cb = |p: &SearchProgress| {
            calls.set(calls.get() + 1);
            last.set(p.trials_completed);
        };
        let mut sampler = RandomSampler::new(1);
        run_search(
            &SearchConfig { n_trials: 5, timeout: None },
            &space(),
            &Objective::new(SignalType::Buy),
            &rows(20),
            &mut sampler,
            Some(&cb as &dyn Fn(&SearchProgress)),
            None,
        )
        .unwrap();
        assert!(calls.get() >= 1);
        assert_eq!(last.get(), 5);
    }

    #[test]
    fn trial_serializes_infinite_score() {
        let t = Trial {
            number: 3,
            params: ParamVector::new().with("rsi_buy_th", 61.0),
            score: f64::INFINITY,
            n_rows: 12,
        };
        let json = serde_json::to_string(&t).unwrap();
        let back: Trial = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
