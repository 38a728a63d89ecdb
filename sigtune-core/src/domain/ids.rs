use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Experiment run identifier: `run_<YYYYmmdd_HHMMSS_ffffff>` (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

static LAST_ISSUED_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

impl RunId {
    /// New id from the current time.
    ///
    /// Two calls in the same process never return the same id: if the clock
    /// has not advanced a microsecond, the timestamp is bumped past the last
    /// one issued.
    pub fn generate() -> Self {
        let now = Utc::now().timestamp_micros();
        let mut last = LAST_ISSUED_MICROS.load(Ordering::Relaxed);
        let issued = loop {
            let candidate = now.max(last.saturating_add(1));
            match LAST_ISSUED_MICROS.compare_exchange_weak(
                last,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break candidate,
                Err(actual) => last = actual,
            }
        };
        match DateTime::<Utc>::from_timestamp_micros(issued) {
            Some(ts) => Self::at(ts),
            None => Self::at(Utc::now()),
        }
    }

    pub fn at(ts: DateTime<Utc>) -> Self {
        Self(format!("run_{}", ts.format("%Y%m%d_%H%M%S_%6f")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content hash of the labeled rows a run was tuned on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn run_id_format() {
        let ts = Utc.with_ymd_and_hms(2024, 10, 3, 9, 5, 7).unwrap();
        assert_eq!(RunId::at(ts).as_str(), "run_20241003_090507_000000");
    }

    #[test]
    fn generated_ids_are_unique_in_process() {
        let ids: HashSet<RunId> = (0..1000).map(|_| RunId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn generated_ids_sort_chronologically() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert!(a < b);
    }
}
