//! Experiment recorder — one immutable record per completed tuning run.
//!
//! The recorder exposes no update or delete; history only grows.

use chrono::Utc;
use tracing::info;

use sigtune_core::domain::{DatasetHash, Experiment, ParamVector, RunId, SignalType};
use sigtune_core::metrics::MetricsReport;

use crate::store::{SignalStore, StoreError};

/// Everything a finished run contributes to its record besides the id.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub signal_type: SignalType,
    pub params: ParamVector,
    pub test_metrics: MetricsReport,
    pub train_score: f64,
    pub n_trials_completed: usize,
    pub config_fingerprint: String,
    pub dataset_hash: DatasetHash,
}

pub struct ExperimentRecorder<'a, S: SignalStore + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: SignalStore + ?Sized> ExperimentRecorder<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Stamp a fresh run id and append the record. Exactly one store write.
    pub fn record(&mut self, summary: RunSummary) -> Result<Experiment, StoreError> {
        let experiment = Experiment {
            run_id: RunId::generate(),
            created_at: Utc::now(),
            signal_type: summary.signal_type,
            params: summary.params,
            metrics: summary.test_metrics,
            train_score: summary.train_score,
            n_trials_completed: summary.n_trials_completed,
            config_fingerprint: summary.config_fingerprint,
            dataset_hash: summary.dataset_hash,
        };
        self.store.append_experiment(&experiment)?;
        info!(
            run_id = %experiment.run_id,
            signal_type = %experiment.signal_type,
            train_score = experiment.train_score,
            test_pf = experiment.metrics.pf,
            "experiment recorded"
        );
        Ok(experiment)
    }

    /// Past experiments, oldest first, optionally for one signal type.
    pub fn history(&self, signal_type: Option<SignalType>) -> Result<Vec<Experiment>, StoreError> {
        let mut experiments = self.store.experiments()?;
        if let Some(t) = signal_type {
            experiments.retain(|e| e.signal_type == t);
        }
        experiments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(experiments)
    }
}
