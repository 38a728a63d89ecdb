//! Tuning orchestration — load, split, search, validate, record.
//!
//! The store is read once at the start and written once at the end. Any
//! failure before the final append leaves the experiment log untouched.

use std::sync::atomic::AtomicBool;

use thiserror::Error;
use tracing::info;

use sigtune_core::domain::Experiment;
use sigtune_core::metrics::MetricsReport;
use sigtune_core::view::ViewError;

use crate::config::{ConfigError, TuneConfig};
use crate::data_loader::load_signals_with_labels;
use crate::engine::{run_search, SearchError, SearchOutcome, SearchProgress, Trial};
use crate::recorder::{ExperimentRecorder, RunSummary};
use crate::store::{SignalStore, StoreError};

#[derive(Debug, Error)]
pub enum TuneError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("view error: {0}")]
    View(#[from] ViewError),
    #[error("training split is empty: {rows} labeled signal(s) at train_ratio {train_ratio}")]
    EmptyTrainSplit { rows: usize, train_ratio: f64 },
    #[error(transparent)]
    Search(#[from] SearchError),
}

impl TuneError {
    /// The run could not start because there was nothing to tune on.
    pub fn is_no_data(&self) -> bool {
        matches!(self, TuneError::Search(SearchError::NoData))
    }
}

#[derive(Debug, Clone)]
pub struct TuneResult {
    pub experiment: Experiment,
    pub search: SearchOutcome,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl TuneResult {
    pub fn best(&self) -> &Trial {
        self.search.best()
    }

    pub fn test_metrics(&self) -> &MetricsReport {
        &self.experiment.metrics
    }
}

/// Run one tuning job end to end against `store`.
///
/// Fails with [`SearchError::NoData`] before any trial when the store has no
/// usable labeled signals, and with [`TuneError::EmptyTrainSplit`] when there
/// are too few for the split to leave any training rows. The best vector's test-split metrics are
/// reported only; they never influence which trial is best.
pub fn run_optimization<S: SignalStore + ?Sized>(
    store: &mut S,
    config: &TuneConfig,
    progress_cb: Option<&dyn Fn(&SearchProgress)>,
    cancel: Option<&AtomicBool>,
) -> Result<TuneResult, TuneError> {
    config.validate()?;

    let table = load_signals_with_labels(&*store, config.search.min_labels)?;
    if table.is_empty() {
        return Err(SearchError::NoData.into());
    }
    let dataset_hash = table.dataset_hash();

    let (train, test) = table.split_walk_forward(config.search.train_ratio)?;
    info!(train = train.len(), test = test.len(), "walk-forward split");
    if train.is_empty() {
        return Err(TuneError::EmptyTrainSplit {
            rows: table.len(),
            train_ratio: config.search.train_ratio,
        });
    }

    let objective = config.objective();
    let space = config.search_space();
    let mut sampler = config.build_sampler();
    let search = run_search(
        &config.search_config(),
        &space,
        &objective,
        train.rows(),
        sampler.as_mut(),
        progress_cb,
        cancel,
    )?;

    let best = search.best();
    let test_metrics = objective.report(test.rows(), &best.params);
    info!(
        trades = test_metrics.total_trades,
        pf = test_metrics.pf,
        mdd = test_metrics.mdd,
        psu_10 = test_metrics.psu_10,
        "test-set validation"
    );

    let experiment = ExperimentRecorder::new(store).record(RunSummary {
        signal_type: config.search.signal_type,
        params: best.params.clone(),
        test_metrics,
        train_score: best.score,
        n_trials_completed: search.trials.len(),
        config_fingerprint: config.fingerprint(),
        dataset_hash,
    })?;

    Ok(TuneResult {
        experiment,
        search,
        train_rows: train.len(),
        test_rows: test.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn empty_store_is_no_data() {
        let mut store = MemoryStore::new();
        let err = run_optimization(&mut store, &TuneConfig::default(), None, None).unwrap_err();
        assert!(err.is_no_data());
        assert!(store.experiments().unwrap().is_empty());
    }

    #[test]
    fn invalid_config_rejected_before_loading() {
        let mut store = MemoryStore::new();
        let mut config = TuneConfig::default();
        config.search.n_trials = 0;
        let err = run_optimization(&mut store, &config, None, None).unwrap_err();
        assert!(matches!(err, TuneError::Config(ConfigError::NoTrials)));
    }
}
