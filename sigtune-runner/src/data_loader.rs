//! Data loading — pull signals and labels from a store into a labeled table.

use sigtune_core::view::LabeledTable;
use tracing::info;

use crate::store::{SignalQuery, SignalStore, StoreError};

/// Load every stored signal that has at least `min_labels` horizon labels.
///
/// Store failures propagate unchanged; there are no retries here.
pub fn load_signals_with_labels<S: SignalStore + ?Sized>(
    store: &S,
    min_labels: usize,
) -> Result<LabeledTable, StoreError> {
    load_matching(store, &SignalQuery::all(), min_labels)
}

/// As [`load_signals_with_labels`], restricted to signals matching `query`.
pub fn load_matching<S: SignalStore + ?Sized>(
    store: &S,
    query: &SignalQuery,
    min_labels: usize,
) -> Result<LabeledTable, StoreError> {
    let signals = store.signals(query)?;
    let labels = store.labels()?;
    let table = LabeledTable::from_signals(&signals, &labels, min_labels);
    info!(
        signals = signals.len(),
        labels = labels.len(),
        usable = table.len(),
        min_labels,
        "loaded labeled signals"
    );
    Ok(table)
}
