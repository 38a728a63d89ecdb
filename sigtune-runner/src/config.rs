//! Serializable tuning-run configuration (TOML).
//!
//! ```toml
//! [search]
//! signal_type = "BUY"
//! n_trials = 100
//! timeout_secs = 3600   # 0 disables the timeout
//! seed = 42
//! min_labels = 4
//! train_ratio = 0.7
//! sampler = "tpe"
//!
//! [objective]
//! min_rows = 10
//! hit_threshold = 0.02
//! [objective.weights]
//! profit_factor = 0.4
//! drawdown = 0.2
//! hit_rate = 0.3
//! win_rate = 0.1
//!
//! [tpe]
//! n_startup_trials = 10
//!
//! [[space]]
//! kind = "float"
//! name = "rsi_buy_th"
//! low = 50
//! high = 70
//! ```
//!
//! Every section is optional. Without `[[space]]` the 17-dimension reference
//! space is searched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sigtune_core::domain::SignalType;
use sigtune_core::filter::MIN_VIABLE_ROWS;
use sigtune_core::metrics::DEFAULT_HIT_THRESHOLD;
use sigtune_core::objective::{Objective, ObjectiveError, ObjectiveWeights};
use sigtune_core::view::{DEFAULT_MIN_LABELS, DEFAULT_TRAIN_RATIO};

use crate::engine::SearchConfig;
use crate::sampler::{ParamSampler, RandomSampler, TpeConfig, TpeConfigError, TpeSampler};
use crate::space::{Dimension, SearchSpace, SpaceError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("only BUY or SELL can be tuned, got {0}")]
    UnsupportedSignalType(SignalType),

    #[error("n_trials must be at least 1")]
    NoTrials,

    #[error("train_ratio must be in (0, 1), got {0}")]
    TrainRatio(f64),

    #[error("hit_threshold must be finite and non-negative, got {0}")]
    HitThreshold(f64),

    #[error("min_rows must be at least {min}, got {got}")]
    MinRows { got: usize, min: usize },

    #[error(transparent)]
    Space(#[from] SpaceError),

    #[error(transparent)]
    Tpe(#[from] TpeConfigError),

    #[error(transparent)]
    Objective(#[from] ObjectiveError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    #[default]
    Tpe,
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub signal_type: SignalType,
    pub n_trials: usize,
    /// Seconds; 0 means no timeout.
    pub timeout_secs: u64,
    pub seed: u64,
    pub min_labels: usize,
    pub train_ratio: f64,
    pub sampler: SamplerKind,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            signal_type: SignalType::Buy,
            n_trials: 100,
            timeout_secs: 3600,
            seed: 42,
            min_labels: DEFAULT_MIN_LABELS,
            train_ratio: DEFAULT_TRAIN_RATIO,
            sampler: SamplerKind::Tpe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveSection {
    pub weights: ObjectiveWeights,
    pub min_rows: usize,
    pub hit_threshold: f64,
}

impl Default for ObjectiveSection {
    fn default() -> Self {
        Self {
            weights: ObjectiveWeights::default(),
            min_rows: MIN_VIABLE_ROWS,
            hit_threshold: DEFAULT_HIT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneConfig {
    pub search: SearchSection,
    pub objective: ObjectiveSection,
    pub tpe: TpeConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space: Option<Vec<Dimension>>,
}

impl TuneConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reject anything that would otherwise surface mid-search.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.search;
        if !matches!(s.signal_type, SignalType::Buy | SignalType::Sell) {
            return Err(ConfigError::UnsupportedSignalType(s.signal_type));
        }
        if s.n_trials == 0 {
            return Err(ConfigError::NoTrials);
        }
        if !(s.train_ratio > 0.0 && s.train_ratio < 1.0) {
            return Err(ConfigError::TrainRatio(s.train_ratio));
        }
        if self.objective.min_rows < MIN_VIABLE_ROWS {
            return Err(ConfigError::MinRows {
                got: self.objective.min_rows,
                min: MIN_VIABLE_ROWS,
            });
        }
        let th = self.objective.hit_threshold;
        if !th.is_finite() || th < 0.0 {
            return Err(ConfigError::HitThreshold(th));
        }
        self.objective.weights.validate()?;
        self.tpe.validate()?;
        self.search_space().validate()?;
        Ok(())
    }

    pub fn search_space(&self) -> SearchSpace {
        match &self.space {
            Some(dims) => SearchSpace::new(dims.clone()),
            None => SearchSpace::reference(),
        }
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            n_trials: self.search.n_trials,
            timeout: match self.search.timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn objective(&self) -> Objective {
        Objective {
            signal_type: self.search.signal_type,
            weights: self.objective.weights,
            min_rows: self.objective.min_rows,
            hit_threshold: self.objective.hit_threshold,
        }
    }

    pub fn build_sampler(&self) -> Box<dyn ParamSampler> {
        match self.search.sampler {
            SamplerKind::Tpe => Box::new(TpeSampler::new(self.search.seed, self.tpe.clone())),
            SamplerKind::Random => Box::new(RandomSampler::new(self.search.seed)),
        }
    }

    /// BLAKE3 hash of the canonical JSON form. Two configs that tune the same
    /// way share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let canonical = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(_) => format!("{self:?}"),
        };
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}
