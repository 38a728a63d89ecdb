//! Experiment — the immutable record of one completed tuning run.

use super::ids::{DatasetHash, RunId};
use super::params::ParamVector;
use super::signal::SignalType;
use crate::metrics::MetricsReport;
use crate::serde_ext::extended_f64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `params` is always a vector the search engine actually evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub signal_type: SignalType,
    pub params: ParamVector,
    /// Held-out (test split) metrics for `params`.
    pub metrics: MetricsReport,
    #[serde(with = "extended_f64")]
    pub train_score: f64,
    pub n_trials_completed: usize,
    pub config_fingerprint: String,
    pub dataset_hash: DatasetHash,
}
