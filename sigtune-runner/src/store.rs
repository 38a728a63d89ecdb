//! Signal store — signals, labels and the append-only experiment log.
//!
//! Two implementations:
//! - [`MemoryStore`] for tests and embedding.
//! - [`JsonlStore`]: one JSON object per line in `signals.jsonl`,
//!   `labels.jsonl` and `experiments.jsonl` under a directory. Each append
//!   serializes the full line first and writes it with a single call, so an
//!   interrupted process never leaves half a record behind.
//!
//! Experiments can be appended and read, never updated or removed.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use sigtune_core::domain::{BarSnapshot, Experiment, Horizon, Label, RunId, Signal, SignalType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}:{line}: malformed record: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("signal {0} already exists")]
    DuplicateSignal(u64),

    #[error("signal {signal_id} already has a {horizon}-bar label")]
    DuplicateLabel { signal_id: u64, horizon: Horizon },

    #[error("label refers to unknown signal {0}")]
    UnknownSignal(u64),

    #[error("experiment {0} already recorded")]
    DuplicateRun(RunId),
}

/// Filter over stored signals. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalQuery {
    pub signal_type: Option<SignalType>,
    pub symbol: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl SignalQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        self.signal_type.map_or(true, |t| signal.signal_type == t)
            && self.symbol.as_deref().map_or(true, |s| signal.symbol == s)
            && self.since.map_or(true, |t| signal.ts >= t)
            && self.until.map_or(true, |t| signal.ts <= t)
    }
}

pub trait SignalStore {
    fn signals(&self, query: &SignalQuery) -> Result<Vec<Signal>, StoreError>;

    fn labels(&self) -> Result<Vec<Label>, StoreError>;

    fn experiments(&self) -> Result<Vec<Experiment>, StoreError>;

    fn append_signal(&mut self, signal: &Signal) -> Result<(), StoreError>;

    /// Rejects a second label for the same `(signal_id, horizon)`.
    fn append_label(&mut self, label: &Label) -> Result<(), StoreError>;

    /// Set the signal-bar OHLC once. `Ok(false)` if it was already set.
    fn backfill_bar(&mut self, signal_id: u64, bar: BarSnapshot) -> Result<bool, StoreError>;

    /// Rejects a run id that is already present.
    fn append_experiment(&mut self, experiment: &Experiment) -> Result<(), StoreError>;
}

fn check_label(signals: &[Signal], labels: &[Label], label: &Label) -> Result<(), StoreError> {
    if !signals.iter().any(|s| s.id == label.signal_id) {
        return Err(StoreError::UnknownSignal(label.signal_id));
    }
    if labels
        .iter()
        .any(|l| l.signal_id == label.signal_id && l.horizon == label.horizon)
    {
        return Err(StoreError::DuplicateLabel {
            signal_id: label.signal_id,
            horizon: label.horizon,
        });
    }
    Ok(())
}

// ─── In-memory store ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    signals: Vec<Signal>,
    labels: Vec<Label>,
    experiments: Vec<Experiment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalStore for MemoryStore {
    fn signals(&self, query: &SignalQuery) -> Result<Vec<Signal>, StoreError> {
        Ok(self.signals.iter().filter(|s| query.matches(s)).cloned().collect())
    }

    fn labels(&self) -> Result<Vec<Label>, StoreError> {
        Ok(self.labels.clone())
    }

    fn experiments(&self) -> Result<Vec<Experiment>, StoreError> {
        Ok(self.experiments.clone())
    }

    fn append_signal(&mut self, signal: &Signal) -> Result<(), StoreError> {
        if self.signals.iter().any(|s| s.id == signal.id) {
            return Err(StoreError::DuplicateSignal(signal.id));
        }
        self.signals.push(signal.clone());
        Ok(())
    }

    fn append_label(&mut self, label: &Label) -> Result<(), StoreError> {
        check_label(&self.signals, &self.labels, label)?;
        self.labels.push(label.clone());
        Ok(())
    }

    fn backfill_bar(&mut self, signal_id: u64, bar: BarSnapshot) -> Result<bool, StoreError> {
        match self.signals.iter_mut().find(|s| s.id == signal_id) {
            Some(signal) => Ok(signal.backfill_bar(bar)),
            None => Err(StoreError::UnknownSignal(signal_id)),
        }
    }

    fn append_experiment(&mut self, experiment: &Experiment) -> Result<(), StoreError> {
        if self.experiments.iter().any(|e| e.run_id == experiment.run_id) {
            return Err(StoreError::DuplicateRun(experiment.run_id.clone()));
        }
        self.experiments.push(experiment.clone());
        Ok(())
    }
}

// ─── JSONL store ─────────────────────────────────────────────────────

const SIGNALS_FILE: &str = "signals.jsonl";
const LABELS_FILE: &str = "labels.jsonl";
const EXPERIMENTS_FILE: &str = "experiments.jsonl";

#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut out = Vec::new();
    for (idx, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        out.push(record);
    }
    Ok(out)
}

fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let io_err = |source: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(line.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    Ok(())
}

/// Replace `path` with `records` via a temp file and rename.
fn rewrite_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }
    let tmp = path.with_extension("jsonl.tmp");
    let io_err = |source: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, buf).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

impl SignalStore for JsonlStore {
    fn signals(&self, query: &SignalQuery) -> Result<Vec<Signal>, StoreError> {
        let all: Vec<Signal> = read_jsonl(&self.path(SIGNALS_FILE))?;
        Ok(all.into_iter().filter(|s| query.matches(s)).collect())
    }

    fn labels(&self) -> Result<Vec<Label>, StoreError> {
        read_jsonl(&self.path(LABELS_FILE))
    }

    fn experiments(&self) -> Result<Vec<Experiment>, StoreError> {
        read_jsonl(&self.path(EXPERIMENTS_FILE))
    }

    fn append_signal(&mut self, signal: &Signal) -> Result<(), StoreError> {
        let existing: HashSet<u64> = self
            .signals(&SignalQuery::all())?
            .iter()
            .map(|s| s.id)
            .collect();
        if existing.contains(&signal.id) {
            return Err(StoreError::DuplicateSignal(signal.id));
        }
        append_jsonl(&self.path(SIGNALS_FILE), signal)
    }

    fn append_label(&mut self, label: &Label) -> Result<(), StoreError> {
        let signals = self.signals(&SignalQuery::all())?;
        let labels = self.labels()?;
        check_label(&signals, &labels, label)?;
        append_jsonl(&self.path(LABELS_FILE), label)
    }

    fn backfill_bar(&mut self, signal_id: u64, bar: BarSnapshot) -> Result<bool, StoreError> {
        let mut signals = self.signals(&SignalQuery::all())?;
        let signal = signals
            .iter_mut()
            .find(|s| s.id == signal_id)
            .ok_or(StoreError::UnknownSignal(signal_id))?;
        if !signal.backfill_bar(bar) {
            return Ok(false);
        }
        rewrite_jsonl(&self.path(SIGNALS_FILE), &signals)?;
        Ok(true)
    }

    fn append_experiment(&mut self, experiment: &Experiment) -> Result<(), StoreError> {
        if self
            .experiments()?
            .iter()
            .any(|e| e.run_id == experiment.run_id)
        {
            return Err(StoreError::DuplicateRun(experiment.run_id.clone()));
        }
        append_jsonl(&self.path(EXPERIMENTS_FILE), experiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sigtune_core::domain::{EmittedParams, FeatureSet};

    fn signal(id: u64, symbol: &str, signal_type: SignalType, day: u32) -> Signal {
        Signal {
            id,
            ts: Utc.with_ymd_and_hms(2024, 2, day, 0, 0, 0).unwrap(),
            symbol: symbol.into(),
            timeframe: "1d".into(),
            signal_type,
            features: FeatureSet::default(),
            params: EmittedParams::default(),
            bar: None,
        }
    }

    #[test]
    fn query_filters_by_every_field() {
        let mut store = MemoryStore::new();
        store.append_signal(&signal(1, "AAPL", SignalType::Buy, 1)).unwrap();
        store.append_signal(&signal(2, "AAPL", SignalType::Sell, 2)).unwrap();
        store.append_signal(&signal(3, "MSFT", SignalType::Buy, 3)).unwrap();

        let buys = SignalQuery { signal_type: Some(SignalType::Buy), ..SignalQuery::all() };
        assert_eq!(store.signals(&buys).unwrap().len(), 2);

        let aapl = SignalQuery { symbol: Some("AAPL".into()), ..SignalQuery::all() };
        assert_eq!(store.signals(&aapl).unwrap().len(), 2);

        let window = SignalQuery {
            since: Some(Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap()),
            until: Some(Utc.with_ymd_and_hms(2024, 2, 2, 23, 0, 0).unwrap()),
            ..SignalQuery::all()
        };
        let hits = store.signals(&window).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn label_needs_known_signal_and_unique_horizon() {
        let mut store = MemoryStore::new();
        let label = Label {
            signal_id: 1,
            horizon: Horizon::H5,
            fwd_ret: 0.01,
            broke_high: false,
            broke_low: false,
        };
        assert!(matches!(store.append_label(&label), Err(StoreError::UnknownSignal(1))));

        store.append_signal(&signal(1, "AAPL", SignalType::Buy, 1)).unwrap();
        store.append_label(&label).unwrap();
        assert!(matches!(
            store.append_label(&label),
            Err(StoreError::DuplicateLabel { signal_id: 1, horizon: Horizon::H5 })
        ));
    }

    #[test]
    fn duplicate_signal_rejected() {
        let mut store = MemoryStore::new();
        store.append_signal(&signal(1, "AAPL", SignalType::Buy, 1)).unwrap();
        assert!(matches!(
            store.append_signal(&signal(1, "AAPL", SignalType::Buy, 1)),
            Err(StoreError::DuplicateSignal(1))
        ));
    }

    #[test]
    fn memory_backfill_once() {
        let mut store = MemoryStore::new();
        store.append_signal(&signal(1, "AAPL", SignalType::Buy, 1)).unwrap();
        let bar = BarSnapshot { open: 1.0, high: 1.2, low: 0.9, close: 1.1 };
        assert!(store.backfill_bar(1, bar).unwrap());
        assert!(!store.backfill_bar(1, bar).unwrap());
        assert!(store.backfill_bar(9, bar).is_err());
    }
}
