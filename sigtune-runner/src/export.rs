//! Export — trial logs, experiment history and the labeled table as CSV, and
//! the labeled table as Parquet.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::ParquetWriter;

use sigtune_core::domain::{Experiment, Horizon};
use sigtune_core::view::LabeledTable;

use crate::engine::Trial;

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// One line per trial. Parameter columns are the union of all names, sorted;
/// a trial missing a parameter leaves the cell empty.
pub fn export_trials_csv(trials: &[Trial]) -> Result<String> {
    let names: BTreeSet<&str> = trials
        .iter()
        .flat_map(|t| t.params.iter().map(|(name, _)| name))
        .collect();

    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec!["number", "score", "n_rows"];
    header.extend(names.iter().copied());
    wtr.write_record(&header)?;

    for t in trials {
        let mut record = vec![t.number.to_string(), t.score.to_string(), t.n_rows.to_string()];
        record.extend(names.iter().map(|name| {
            t.params
                .get_f64(name)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Experiment history with the test metrics flattened into columns.
pub fn export_experiments_csv(experiments: &[Experiment]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header = vec![
        "run_id",
        "created_at",
        "signal_type",
        "train_score",
        "n_trials",
    ];
    header.extend(sigtune_core::metrics::MetricsReport::empty().entries().map(|(k, _)| k));
    header.push("params");
    wtr.write_record(&header)?;

    for e in experiments {
        let mut record = vec![
            e.run_id.to_string(),
            e.created_at.to_rfc3339(),
            e.signal_type.to_string(),
            e.train_score.to_string(),
            e.n_trials_completed.to_string(),
        ];
        record.extend(e.metrics.entries().iter().map(|(_, v)| v.to_string()));
        record.push(e.params.to_string());
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// The labeled table with features and the forward return at every horizon.
pub fn export_table_csv(table: &LabeledTable) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut header: Vec<String> = [
        "signal_id",
        "ts",
        "symbol",
        "tf",
        "signal",
        "trend_score",
        "prob",
        "rsi",
        "vol_mult",
        "vcp_ratio",
        "dist_ath",
        "vix",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(Horizon::ALL.iter().map(|h| format!("fwd_ret_{}", h.bars())));
    wtr.write_record(&header)?;

    for r in table.rows() {
        let f = &r.features;
        let mut record = vec![
            r.signal_id.to_string(),
            r.ts.to_rfc3339(),
            r.symbol.clone(),
            r.timeframe.clone(),
            r.signal_type.to_string(),
            f.trend_score.to_string(),
            f.prob.to_string(),
            f.rsi.to_string(),
            f.vol_mult.to_string(),
            f.vcp_ratio.to_string(),
            f.dist_ath.to_string(),
            f.macro_ctx.vix.to_string(),
        ];
        record.extend(Horizon::ALL.iter().map(|h| r.fwd_ret(*h).to_string()));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

// ─── Parquet export ─────────────────────────────────────────────────

pub fn write_table_parquet(path: &Path, table: &LabeledTable) -> Result<()> {
    let mut df = table
        .to_dataframe()
        .context("Failed to build labeled dataframe")?;
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create parquet {}", path.display()))?;
    ParquetWriter::new(&mut file)
        .finish(&mut df)
        .context("Failed to write labeled parquet")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::rsi_row;
    use sigtune_core::domain::{ParamValue, ParamVector};

    #[test]
    fn trials_csv_unions_param_columns() {
        let trials = vec![
            Trial {
                number: 0,
                params: ParamVector::new().with("rsi_buy_th", 55.5),
                score: 0.0,
                n_rows: 3,
            },
            Trial {
                number: 1,
                params: ParamVector::new()
                    .with("rsi_buy_th", 61.0)
                    .with("cooldown_bars", ParamValue::Int(4)),
                score: f64::INFINITY,
                n_rows: 12,
            },
        ];
        let csv = export_trials_csv(&trials).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "number,score,n_rows,cooldown_bars,rsi_buy_th");
        assert_eq!(lines[1], "0,0,3,,55.5");
        assert_eq!(lines[2], "1,inf,12,4,61");
    }

    #[test]
    fn table_csv_has_one_line_per_row() {
        let table = LabeledTable::new(vec![rsi_row(1, 62.0, 0.05), rsi_row(2, 48.0, -0.01)]);
        let csv = export_table_csv(&table).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("fwd_ret_3,fwd_ret_5,fwd_ret_10,fwd_ret_20"));
        assert!(lines[1].starts_with("1,2024-01-01T01:00:00+00:00,BTCUSDT,1h,BUY,"));
    }

    #[test]
    fn parquet_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labeled.parquet");
        let table = LabeledTable::new(vec![rsi_row(1, 62.0, 0.05)]);
        write_table_parquet(&path, &table).unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }
}
