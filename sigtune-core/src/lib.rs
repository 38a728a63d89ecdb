//! Sigtune Core — domain types, metrics, labeled-signal view, filter simulation,
//! objective function.
//!
//! Everything here is pure and in-memory:
//! - Domain types (signals, labels, horizons, parameter vectors, experiments)
//! - Metrics engine over per-trade return sequences
//! - Labeled table with chronological walk-forward split
//! - Filter simulation of historical signals under candidate thresholds
//! - Composite objective with a hard floor for undersized samples
//! - BLAKE3-derived RNG hierarchy for reproducible search

pub mod domain;
pub mod filter;
pub mod metrics;
pub mod objective;
pub mod rng;
pub mod serde_ext;
pub mod view;

pub use domain::{
    Experiment, Horizon, Label, ParamValue, ParamVector, RunId, Signal, SignalType,
};
pub use filter::{simulate_filter, FilterThresholds, MIN_VIABLE_ROWS};
pub use metrics::{calculate_all_metrics, MetricsReport};
pub use objective::{Objective, ObjectiveError, ObjectiveWeights, TrialEvaluation};
pub use view::{LabeledRow, LabeledTable, SignalStats, ViewError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the search loop shares is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();
        require_send::<domain::Label>();
        require_sync::<domain::Label>();
        require_send::<domain::ParamVector>();
        require_sync::<domain::ParamVector>();
        require_send::<domain::Experiment>();
        require_sync::<domain::Experiment>();

        require_send::<view::LabeledTable>();
        require_sync::<view::LabeledTable>();
        require_send::<metrics::MetricsReport>();
        require_sync::<metrics::MetricsReport>();
        require_send::<objective::Objective>();
        require_sync::<objective::Objective>();
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }
}
