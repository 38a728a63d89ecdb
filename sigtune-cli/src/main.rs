//! Sigtune CLI — tune alert parameters and manage presets.
//!
//! Commands:
//! - `tune` — search filter parameters on labeled signals and record the run
//! - `stats` — summary counts and means of the labeled table
//! - `experiments` — list recorded tuning runs
//! - `ablation` — per-feature impact on BUY performance
//! - `backtest` — compounding backtest of one signal type
//! - `export` — labeled table as CSV and/or Parquet
//! - `preset show|promote|compare|pine` — two-slot preset lifecycle

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use sigtune_core::domain::SignalType;
use sigtune_core::metrics::MetricsReport;
use sigtune_runner::ablation::{AblationAnalyzer, DEFAULT_FEATURES};
use sigtune_runner::backtest::{backtest_params, run_backtest, DEFAULT_INITIAL_CAPITAL};
use sigtune_runner::engine::SearchProgress;
use sigtune_runner::export::{
    export_experiments_csv, export_table_csv, export_trials_csv, write_table_parquet,
};
use sigtune_runner::preset::{create_preset, pine_snippet, PresetManager, Promotion};
use sigtune_runner::recorder::ExperimentRecorder;
use sigtune_runner::store::JsonlStore;
use sigtune_runner::{load_signals_with_labels, run_optimization, TuneConfig};

#[derive(Parser)]
#[command(
    name = "sigtune",
    about = "Sigtune CLI — parameter tuning for trading-signal alerts"
)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search filter parameters on the training split and record the run.
    Tune {
        /// Signal type to tune: BUY or SELL.
        #[arg(long)]
        signal_type: Option<SignalType>,

        /// Trial budget.
        #[arg(long)]
        trials: Option<usize>,

        /// Wall-clock limit in seconds (0 disables).
        #[arg(long)]
        timeout: Option<u64>,

        /// Sampler seed.
        #[arg(long)]
        seed: Option<u64>,

        /// TOML run configuration; flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Save the best vector as the candidate preset.
        #[arg(long, default_value_t = false)]
        save_preset: bool,

        /// Write every trial to this CSV file.
        #[arg(long)]
        trials_csv: Option<PathBuf>,

        /// Store directory.
        #[arg(long, default_value = "data")]
        store: PathBuf,

        /// Preset directory.
        #[arg(long, default_value = "presets")]
        presets: PathBuf,
    },
    /// Summary counts and means over the labeled signals.
    Stats {
        #[arg(long, default_value = "4")]
        min_labels: usize,

        #[arg(long, default_value = "data")]
        store: PathBuf,
    },
    /// List recorded tuning runs, oldest first.
    Experiments {
        #[arg(long)]
        signal_type: Option<SignalType>,

        /// Write the list to this CSV file instead of printing it.
        #[arg(long)]
        csv: Option<PathBuf>,

        #[arg(long, default_value = "data")]
        store: PathBuf,
    },
    /// Per-feature impact on BUY performance.
    Ablation {
        /// Features to analyse. Defaults to the core feature set.
        #[arg(long, value_delimiter = ',')]
        features: Vec<String>,

        /// Quantile buckets for the per-feature breakdown.
        #[arg(long, default_value = "4")]
        quantiles: usize,

        #[arg(long, default_value = "data")]
        store: PathBuf,
    },
    /// Compounding backtest of one signal type.
    Backtest {
        #[arg(long, default_value = "BUY")]
        signal_type: SignalType,

        #[arg(long, default_value_t = DEFAULT_INITIAL_CAPITAL)]
        capital: f64,

        /// Only trade signals the given preset slot would let through.
        #[arg(long, value_enum)]
        preset: Option<Slot>,

        #[arg(long, default_value = "data")]
        store: PathBuf,

        #[arg(long, default_value = "presets")]
        presets: PathBuf,
    },
    /// Export the labeled table.
    Export {
        #[arg(long)]
        csv: Option<PathBuf>,

        #[arg(long)]
        parquet: Option<PathBuf>,

        #[arg(long, default_value = "4")]
        min_labels: usize,

        #[arg(long, default_value = "data")]
        store: PathBuf,
    },
    /// Preset lifecycle commands.
    Preset {
        #[command(subcommand)]
        action: PresetAction,

        #[arg(long, default_value = "presets", global = true)]
        presets: PathBuf,
    },
}

#[derive(Subcommand)]
enum PresetAction {
    /// Print a preset slot as JSON.
    Show {
        #[arg(value_enum, default_value = "current")]
        slot: Slot,
    },
    /// Back up current and make the candidate live.
    Promote,
    /// Metric-by-metric comparison of current and candidate.
    Compare,
    /// Parameter block for the charting script.
    Pine {
        #[arg(value_enum, default_value = "current")]
        slot: Slot,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Slot {
    Current,
    Candidate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Tune {
            signal_type,
            trials,
            timeout,
            seed,
            config,
            save_preset,
            trials_csv,
            store,
            presets,
        } => run_tune(
            signal_type,
            trials,
            timeout,
            seed,
            config,
            save_preset,
            trials_csv,
            &store,
            &presets,
        ),
        Commands::Stats { min_labels, store } => run_stats(&store, min_labels),
        Commands::Experiments {
            signal_type,
            csv,
            store,
        } => run_experiments(&store, signal_type, csv),
        Commands::Ablation {
            features,
            quantiles,
            store,
        } => run_ablation(&store, features, quantiles),
        Commands::Backtest {
            signal_type,
            capital,
            preset,
            store,
            presets,
        } => run_backtest_cmd(&store, &presets, signal_type, capital, preset),
        Commands::Export {
            csv,
            parquet,
            min_labels,
            store,
        } => run_export(&store, min_labels, csv, parquet),
        Commands::Preset { action, presets } => run_preset(&presets, action),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact()
        .with_env_filter(filter)
        .init();
}

fn open_store(dir: &Path) -> Result<JsonlStore> {
    JsonlStore::open(dir).with_context(|| format!("failed to open store {}", dir.display()))
}

// ─── tune ────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run_tune(
    signal_type: Option<SignalType>,
    trials: Option<usize>,
    timeout: Option<u64>,
    seed: Option<u64>,
    config_path: Option<PathBuf>,
    save_preset: bool,
    trials_csv: Option<PathBuf>,
    store_dir: &Path,
    presets_dir: &Path,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => TuneConfig::from_file(path)?,
        None => TuneConfig::default(),
    };
    if let Some(t) = signal_type {
        config.search.signal_type = t;
    }
    if let Some(n) = trials {
        config.search.n_trials = n;
    }
    if let Some(secs) = timeout {
        config.search.timeout_secs = secs;
    }
    if let Some(s) = seed {
        config.search.seed = s;
    }

    let mut store = open_store(store_dir)?;
    let progress = |p: &SearchProgress| {
        eprintln!(
            "  trial {}/{}  best={:.4}  {:.1}s",
            p.trials_completed, p.n_trials, p.best_score, p.elapsed_secs
        );
    };

    let result = match run_optimization(
        &mut store,
        &config,
        Some(&progress as &dyn Fn(&SearchProgress)),
        None,
    ) {
        Ok(result) => result,
        Err(e) if e.is_no_data() => {
            eprintln!(
                "No data: no labeled signals in {}. Run the labeler first.",
                store_dir.display()
            );
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let best = result.best();
    println!("Run:          {}", result.experiment.run_id);
    println!("Signal type:  {}", config.search.signal_type);
    println!(
        "Trials:       {} ({:?})",
        result.search.trials.len(),
        result.search.stop_reason
    );
    println!("Train/test:   {} / {}", result.train_rows, result.test_rows);
    println!("Best trial:   #{}  score={:.4}", best.number, best.score);
    println!();
    println!("Best parameters:");
    for (name, value) in best.params.iter() {
        println!("  {name:<16} {value}");
    }
    println!();
    println!("Test-set metrics:");
    print_metrics(result.test_metrics());

    if let Some(path) = trials_csv {
        let csv = export_trials_csv(&result.search.trials)?;
        std::fs::write(&path, csv)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("\nTrials written to {}", path.display());
    }

    if save_preset {
        let manager = PresetManager::new(presets_dir)?;
        let preset = create_preset(&best.params, result.test_metrics(), None);
        let path = manager.save_candidate(&preset)?;
        println!("\nCandidate preset {} saved to {}", preset.version, path.display());
    }

    Ok(())
}

fn print_metrics(m: &MetricsReport) {
    for (key, value) in m.entries() {
        println!("  {key:<16} {value:.4}");
    }
}

// ─── stats / experiments ─────────────────────────────────────────────

fn run_stats(store_dir: &Path, min_labels: usize) -> Result<()> {
    let store = open_store(store_dir)?;
    let table = load_signals_with_labels(&store, min_labels)?;
    let s = table.stats();

    println!("Labeled signals:  {}", s.total_signals);
    println!("  BUY:            {}", s.buy_signals);
    println!("  SELL:           {}", s.sell_signals);
    println!("Avg trend score:  {:.4}", s.avg_trend_score);
    println!("Avg prob:         {:.4}", s.avg_prob);
    println!("Avg RSI:          {:.2}", s.avg_rsi);
    println!("Avg 10-bar ret:   {:.4}", s.avg_fwd_ret_10);
    println!("10-bar win rate:  {:.2}%", s.win_rate_10 * 100.0);
    Ok(())
}

fn run_experiments(
    store_dir: &Path,
    signal_type: Option<SignalType>,
    csv: Option<PathBuf>,
) -> Result<()> {
    let mut store = open_store(store_dir)?;
    let experiments = ExperimentRecorder::new(&mut store).history(signal_type)?;

    if let Some(path) = csv {
        std::fs::write(&path, export_experiments_csv(&experiments)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{} experiments written to {}", experiments.len(), path.display());
        return Ok(());
    }

    if experiments.is_empty() {
        println!("No experiments recorded in {}", store_dir.display());
        return Ok(());
    }
    println!(
        "{:<30} {:<6} {:>7} {:>10} {:>8} {:>8} {:>7}",
        "Run", "Type", "Trials", "Train", "PF", "MDD", "Trades"
    );
    println!("{}", "-".repeat(82));
    for e in &experiments {
        println!(
            "{:<30} {:<6} {:>7} {:>10.4} {:>8.2} {:>8.4} {:>7}",
            e.run_id.as_str(),
            e.signal_type.as_str(),
            e.n_trials_completed,
            e.train_score,
            e.metrics.pf,
            e.metrics.mdd,
            e.metrics.total_trades
        );
    }
    Ok(())
}

// ─── ablation / backtest / export ────────────────────────────────────

fn run_ablation(store_dir: &Path, features: Vec<String>, quantiles: usize) -> Result<()> {
    let store = open_store(store_dir)?;
    let table = load_signals_with_labels(&store, 4)?;
    let analyzer = AblationAnalyzer::new(table)?;

    let names: Vec<&str> = if features.is_empty() {
        DEFAULT_FEATURES.to_vec()
    } else {
        features.iter().map(String::as_str).collect()
    };

    let base = analyzer.baseline();
    println!(
        "Baseline (BUY): PF={:.2}  WinRate={:.2}%  MDD={:.2}%  PSU10={:.2}%  Trades={}",
        base.pf,
        base.win_rate * 100.0,
        base.mdd * 100.0,
        base.psu_10 * 100.0,
        base.total_trades
    );
    println!();
    println!(
        "{:<14} {:>10} {:>10} {:>9} {:>9} {:>6}",
        "Feature", "Impact", "PF after", "WR after", "Rows", "Note"
    );
    println!("{}", "-".repeat(63));
    for row in analyzer.ablation_study(&names)? {
        println!(
            "{:<14} {:>10.4} {:>10.2} {:>8.2}% {:>9} {:>6}",
            row.feature,
            row.impact,
            row.ablated_pf,
            row.ablated_win_rate * 100.0,
            row.rows_kept,
            if row.fell_back { "all" } else { "" }
        );
    }

    for name in &names {
        let impact = analyzer.feature_impact(name, quantiles)?;
        println!("\n{name}:");
        for b in &impact.buckets {
            println!(
                "  Q{} [{:.2} - {:.2}]  n={:<4} PF={:.2}  WR={:.2}%  avg={:.4}",
                b.quantile,
                b.low,
                b.high,
                b.count,
                b.pf,
                b.win_rate * 100.0,
                b.avg_ret
            );
        }
    }
    Ok(())
}

fn run_backtest_cmd(
    store_dir: &Path,
    presets_dir: &Path,
    signal_type: SignalType,
    capital: f64,
    preset: Option<Slot>,
) -> Result<()> {
    let store = open_store(store_dir)?;
    let table = load_signals_with_labels(&store, 4)?;

    let summary = match preset {
        Some(slot) => {
            let preset = load_slot(&PresetManager::new(presets_dir)?, slot)?;
            println!("Filtering with preset {}", preset.version);
            backtest_params(table.rows(), signal_type, &preset.params.to_vector(), capital)
        }
        None => run_backtest(table.rows(), signal_type, capital),
    };

    println!("Trades:         {}", summary.num_trades);
    println!("Initial:        {:.2}", summary.initial_capital);
    println!("Final:          {:.2}", summary.final_capital);
    println!("Total return:   {:.2}%", summary.total_return * 100.0);
    println!("Profit factor:  {:.2}", summary.pf);
    println!("Max drawdown:   {:.2}%", summary.mdd * 100.0);
    println!("Win rate:       {:.2}%", summary.win_rate * 100.0);
    println!("Sharpe:         {:.2}", summary.sharpe);
    Ok(())
}

fn run_export(
    store_dir: &Path,
    min_labels: usize,
    csv: Option<PathBuf>,
    parquet: Option<PathBuf>,
) -> Result<()> {
    if csv.is_none() && parquet.is_none() {
        bail!("nothing to do: pass --csv and/or --parquet");
    }
    let store = open_store(store_dir)?;
    let table = load_signals_with_labels(&store, min_labels)?;

    if let Some(path) = csv {
        std::fs::write(&path, export_table_csv(&table)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{} rows written to {}", table.len(), path.display());
    }
    if let Some(path) = parquet {
        write_table_parquet(&path, &table)?;
        println!("{} rows written to {}", table.len(), path.display());
    }
    Ok(())
}

// ─── preset ──────────────────────────────────────────────────────────

fn load_slot(manager: &PresetManager, slot: Slot) -> Result<sigtune_runner::Preset> {
    Ok(match slot {
        Slot::Current => manager.load_current()?,
        Slot::Candidate => manager.load_candidate()?,
    })
}

fn run_preset(presets_dir: &Path, action: PresetAction) -> Result<()> {
    let manager = PresetManager::new(presets_dir)?;
    match action {
        PresetAction::Show { slot } => {
            let preset = load_slot(&manager, slot)?;
            println!("{}", serde_json::to_string_pretty(&preset)?);
        }
        PresetAction::Promote => match manager.promote()? {
            Promotion::NoCandidate => {
                eprintln!("No candidate preset in {}", presets_dir.display());
                std::process::exit(1);
            }
            Promotion::Promoted { backup } => {
                if let Some(path) = backup {
                    println!("Previous current backed up to {}", path.display());
                }
                println!("Candidate promoted to {}", manager.current_path().display());
            }
        },
        PresetAction::Compare => {
            let cmp = manager.compare_presets()?;
            println!("Current:   {}", cmp.current.version);
            println!("Candidate: {}", cmp.candidate.version);
            println!();
            println!(
                "{:<12} {:>10} {:>10} {:>10} {:>10}",
                "Metric", "Current", "Candidate", "Diff", "Change"
            );
            println!("{}", "-".repeat(56));
            for d in &cmp.metrics_diff {
                println!(
                    "{:<12} {:>10.4} {:>10.4} {:>+10.4} {:>+9.1}%",
                    d.key, d.current, d.candidate, d.diff, d.improvement_pct
                );
            }
        }
        PresetAction::Pine { slot } => {
            println!("{}", pine_snippet(&load_slot(&manager, slot)?));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tune_flags_parse() {
        let cli = Cli::try_parse_from([
            "sigtune",
            "tune",
            "--signal-type",
            "sell",
            "--trials",
            "30",
            "--timeout",
            "60",
            "--save-preset",
        ])
        .unwrap();
        match cli.command {
            Commands::Tune {
                signal_type,
                trials,
                timeout,
                save_preset,
                ..
            } => {
                assert_eq!(signal_type, Some(SignalType::Sell));
                assert_eq!(trials, Some(30));
                assert_eq!(timeout, Some(60));
                assert!(save_preset);
            }
            _ => panic!("expected tune"),
        }
    }

    #[test]
    fn preset_subcommands_parse() {
        let cli = Cli::try_parse_from(["sigtune", "preset", "pine", "candidate"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Preset {
                action: PresetAction::Pine {
                    slot: Slot::Candidate
                },
                ..
            }
        ));
    }
}
