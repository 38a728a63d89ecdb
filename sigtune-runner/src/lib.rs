//! Sigtune Runner — parameter search, stores, experiment recording, presets.
//!
//! This crate builds on `sigtune-core` to provide:
//! - Signal/label/experiment stores (JSONL on disk, in-memory)
//! - Search space and proposal samplers (random, TPE)
//! - Sequential search loop with timeout and cooperative cancel
//! - End-to-end tuning runs recorded as append-only experiments
//! - Two-slot preset lifecycle with backups on promotion
//! - TOML run configuration
//! - Ablation analysis, simple compounding backtest, CSV/Parquet export

pub mod ablation;
pub mod backtest;
pub mod config;
pub mod data_loader;
pub mod engine;
pub mod export;
pub mod preset;
pub mod recorder;
pub mod sampler;
pub mod space;
pub mod store;
pub mod tuner;

#[cfg(test)]
pub(crate) mod test_support;

pub use ablation::{AblationAnalyzer, AblationError, AblationRow, FeatureImpact, QuantileBucket};
pub use backtest::{backtest_params, run_backtest, BacktestSummary};
pub use config::{ConfigError, SamplerKind, TuneConfig};
pub use data_loader::{load_matching, load_signals_with_labels};
pub use engine::{
    run_search, SearchConfig, SearchError, SearchOutcome, SearchProgress, StopReason, Trial,
};
pub use preset::{
    create_preset, pine_snippet, Preset, PresetComparison, PresetError, PresetManager, Promotion,
};
pub use recorder::{ExperimentRecorder, RunSummary};
pub use sampler::{ParamSampler, RandomSampler, TpeConfig, TpeSampler};
pub use space::{Dimension, SearchSpace, SpaceError};
pub use store::{JsonlStore, MemoryStore, SignalQuery, SignalStore, StoreError};
pub use tuner::{run_optimization, TuneError, TuneResult};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn stores_are_send_sync() {
        assert_send::<MemoryStore>();
        assert_sync::<MemoryStore>();
        assert_send::<JsonlStore>();
        assert_sync::<JsonlStore>();
    }

    #[test]
    fn samplers_are_send() {
        assert_send::<TpeSampler>();
        assert_send::<RandomSampler>();
    }

    #[test]
    fn search_types_are_send_sync() {
        assert_send::<SearchOutcome>();
        assert_sync::<SearchOutcome>();
        assert_send::<SearchSpace>();
        assert_sync::<SearchSpace>();
        assert_send::<TuneConfig>();
        assert_sync::<TuneConfig>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<TuneError>();
        assert_sync::<TuneError>();
        assert_send::<PresetError>();
        assert_sync::<PresetError>();
    }
}
