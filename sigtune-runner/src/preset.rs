//! Two-slot preset lifecycle: `current` (live) and `candidate` (staged).
//!
//! Promotion stages a byte-for-byte copy of the candidate, moves the live preset
//! aside to a timestamped backup, then renames the copy into place. The
//! candidate slot is left in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use sigtune_core::domain::ParamVector;
use sigtune_core::metrics::MetricsReport;
use sigtune_core::serde_ext::extended_f64;

const CURRENT_FILE: &str = "preset_A_current.json";
const CANDIDATE_FILE: &str = "preset_B_candidate.json";
const BACKUP_PREFIX: &str = "preset_A_backup_";

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed preset {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialize preset: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PresetError + '_ {
    move |source| PresetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ─── Preset types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroWeights {
    pub vix_w: f64,
    pub dxy_w: f64,
    pub us10y_w: f64,
    pub hygief_w: f64,
}

impl Default for MacroWeights {
    fn default() -> Self {
        Self {
            vix_w: -0.3,
            dxy_w: -0.2,
            us10y_w: -0.2,
            hygief_w: 0.4,
        }
    }
}

/// Indicator parameters as the charting script consumes them.
///
/// Indicator lengths (`ema1`, `ema2`, `rsi`, `vcp`) are not searched.
/// Fields missing from an older preset file take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetParams {
    pub ema1: u32,
    pub ema2: u32,
    pub rsi: u32,
    pub vcp: u32,
    pub rsi_buy_th: f64,
    pub rsi_sell_th: f64,
    pub vol_mult_buy: f64,
    pub vol_mult_sell: f64,
    pub vcp_ratio_th: f64,
    pub dist_ath_max: f64,
    pub macro_weights: MacroWeights,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub epsilon: f64,
    pub hysteresis_len: i64,
    pub cooldown_bars: i64,
}

impl Default for PresetParams {
    fn default() -> Self {
        Self {
            ema1: 20,
            ema2: 50,
            rsi: 14,
            vcp: 20,
            rsi_buy_th: 55.0,
            rsi_sell_th: 45.0,
            vol_mult_buy: 1.5,
            vol_mult_sell: 1.3,
            vcp_ratio_th: 0.5,
            dist_ath_max: 0.15,
            macro_weights: MacroWeights::default(),
            alpha: 0.8,
            beta: 0.35,
            gamma: 0.7,
            delta: 0.6,
            epsilon: 0.8,
            hysteresis_len: 3,
            cooldown_bars: 3,
        }
    }
}

impl PresetParams {
    /// Overlay a searched vector on the defaults. Unknown names are ignored.
    pub fn from_vector(params: &ParamVector) -> Self {
        let mut p = Self::default();
        let float = |name: &str, slot: &mut f64| {
            if let Some(v) = params.get_f64(name) {
                *slot = v;
            }
        };
        float("rsi_buy_th", &mut p.rsi_buy_th);
        float("rsi_sell_th", &mut p.rsi_sell_th);
        float("vol_mult_buy", &mut p.vol_mult_buy);
        float("vol_mult_sell", &mut p.vol_mult_sell);
        float("vcp_ratio_th", &mut p.vcp_ratio_th);
        float("dist_ath_max", &mut p.dist_ath_max);
        float("alpha", &mut p.alpha);
        float("beta", &mut p.beta);
        float("gamma", &mut p.gamma);
        float("delta", &mut p.delta);
        float("epsilon", &mut p.epsilon);
        float("vix_w", &mut p.macro_weights.vix_w);
        float("dxy_w", &mut p.macro_weights.dxy_w);
        float("us10y_w", &mut p.macro_weights.us10y_w);
        float("hygief_w", &mut p.macro_weights.hygief_w);
        if let Some(v) = params.get_f64("hysteresis_len") {
            p.hysteresis_len = v.round() as i64;
        }
        if let Some(v) = params.get_f64("cooldown_bars") {
            p.cooldown_bars = v.round() as i64;
        }
        p
    }

    /// The searched parameters as a vector, e.g. to replay a preset through
    /// the filter.
    pub fn to_vector(&self) -> ParamVector {
        let w = &self.macro_weights;
        ParamVector::new()
            .with("rsi_buy_th", self.rsi_buy_th)
            .with("rsi_sell_th", self.rsi_sell_th)
            .with("vol_mult_buy", self.vol_mult_buy)
            .with("vol_mult_sell", self.vol_mult_sell)
            .with("vcp_ratio_th", self.vcp_ratio_th)
            .with("dist_ath_max", self.dist_ath_max)
            .with("alpha", self.alpha)
            .with("beta", self.beta)
            .with("gamma", self.gamma)
            .with("delta", self.delta)
            .with("epsilon", self.epsilon)
            .with("hysteresis_len", self.hysteresis_len)
            .with("cooldown_bars", self.cooldown_bars)
            .with("vix_w", w.vix_w)
            .with("dxy_w", w.dxy_w)
            .with("us10y_w", w.us10y_w)
            .with("hygief_w", w.hygief_w)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetMetrics {
    #[serde(with = "extended_f64")]
    pub pf: f64,
    pub mdd: f64,
    /// 10-bar hit rate.
    pub psu_success: f64,
    pub win_rate: f64,
    pub total_trades: usize,
}

impl PresetMetrics {
    pub fn from_report(report: &MetricsReport) -> Self {
        Self {
            pf: round_to(report.pf, 2),
            mdd: round_to(report.mdd, 4),
            psu_success: round_to(report.psu_10, 2),
            win_rate: round_to(report.win_rate, 2),
            total_trades: report.total_trades,
        }
    }

    fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("pf", self.pf),
            ("mdd", self.mdd),
            ("psu_success", self.psu_success),
            ("win_rate", self.win_rate),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub params: PresetParams,
    pub metrics: PresetMetrics,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            version: "v0_default".into(),
            created_at: DateTime::<Utc>::default(),
            params: PresetParams::default(),
            metrics: PresetMetrics {
                pf: 1.47,
                mdd: 0.14,
                psu_success: 0.68,
                win_rate: 0.62,
                total_trades: 0,
            },
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Build a preset from a tuned vector and its held-out metrics.
///
/// `version` defaults to `v<YYYY-mm-dd_HHMM>` (UTC).
pub fn create_preset(
    params: &ParamVector,
    metrics: &MetricsReport,
    version: Option<String>,
) -> Preset {
    let now = Utc::now();
    Preset {
        version: version.unwrap_or_else(|| format!("v{}", now.format("%Y-%m-%d_%H%M"))),
        created_at: now,
        params: PresetParams::from_vector(params),
        metrics: PresetMetrics::from_report(metrics),
    }
}

/// Parameter block to paste into the charting script.
pub fn pine_snippet(preset: &Preset) -> String {
    let p = &preset.params;
    let m = &preset.metrics;
    let w = &p.macro_weights;
    format!(
        "// @preset {version}\n\
         // Generated: {created}\n\
         // Metrics: PF={pf}, MDD={mdd:.2}%, WinRate={win:.2}%\n\
         \n\
         ema1_len = {ema1}\n\
         ema2_len = {ema2}\n\
         rsi_len = {rsi}\n\
         vcp_len = {vcp}\n\
         \n\
         rsi_buy_th = {rsi_buy_th}\n\
         rsi_sell_th = {rsi_sell_th}\n\
         vol_mult_buy = {vol_mult_buy}\n\
         vol_mult_sell = {vol_mult_sell}\n\
         vcp_ratio_th = {vcp_ratio_th}\n\
         dist_ath_max = {dist_ath_max}\n\
         \n\
         alpha = {alpha}\n\
         beta = {beta}\n\
         gamma = {gamma}\n\
         delta = {delta}\n\
         epsilon = {epsilon}\n\
         \n\
         hysteresis_len = {hysteresis_len}\n\
         cooldown_bars = {cooldown_bars}\n\
         \n\
         vix_w = {vix_w}\n\
         dxy_w = {dxy_w}\n\
         us10y_w = {us10y_w}\n\
         hygief_w = {hygief_w}",
        version = preset.version,
        created = preset.created_at.to_rfc3339(),
        pf = m.pf,
        mdd = m.mdd * 100.0,
        win = m.win_rate * 100.0,
        ema1 = p.ema1,
        ema2 = p.ema2,
        rsi = p.rsi,
        vcp = p.vcp,
        rsi_buy_th = p.rsi_buy_th,
        rsi_sell_th = p.rsi_sell_th,
        vol_mult_buy = p.vol_mult_buy,
        vol_mult_sell = p.vol_mult_sell,
        vcp_ratio_th = p.vcp_ratio_th,
        dist_ath_max = p.dist_ath_max,
        alpha = p.alpha,
        beta = p.beta,
        gamma = p.gamma,
        delta = p.delta,
        epsilon = p.epsilon,
        hysteresis_len = p.hysteresis_len,
        cooldown_bars = p.cooldown_bars,
        vix_w = w.vix_w,
        dxy_w = w.dxy_w,
        us10y_w = w.us10y_w,
        hygief_w = w.hygief_w,
    )
}

// ─── Comparison ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDiff {
    pub key: &'static str,
    pub current: f64,
    pub candidate: f64,
    pub diff: f64,
    /// Relative change in percent; 0 when `current` is 0.
    pub improvement_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetComparison {
    pub current: Preset,
    pub candidate: Preset,
    pub metrics_diff: Vec<MetricDiff>,
}

// ─── Manager ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    NoCandidate,
    /// `backup` is `None` when there was no current preset to archive.
    Promoted { backup: Option<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct PresetManager {
    dir: PathBuf,
}

impl PresetManager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PresetError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self { dir })
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    pub fn candidate_path(&self) -> PathBuf {
        self.dir.join(CANDIDATE_FILE)
    }

    /// Live preset, or the built-in default if none has been saved.
    pub fn load_current(&self) -> Result<Preset, PresetError> {
        load_or_default(&self.current_path())
    }

    pub fn load_candidate(&self) -> Result<Preset, PresetError> {
        load_or_default(&self.candidate_path())
    }

    pub fn save_current(&self, preset: &Preset) -> Result<PathBuf, PresetError> {
        let path = self.current_path();
        save(preset, &path)?;
        Ok(path)
    }

    pub fn save_candidate(&self, preset: &Preset) -> Result<PathBuf, PresetError> {
        let path = self.candidate_path();
        save(preset, &path)?;
        Ok(path)
    }

    /// Archive current (if any) and make the candidate live.
    pub fn promote(&self) -> Result<Promotion, PresetError> {
        let candidate = self.candidate_path();
        if !candidate.exists() {
            warn!(path = %candidate.display(), "no candidate preset to promote");
            return Ok(Promotion::NoCandidate);
        }

        // A failed copy must leave current untouched.
        let current = self.current_path();
        let tmp = current.with_extension("json.tmp");
        fs::copy(&candidate, &tmp).map_err(io_err(&candidate))?;

        let backup = if current.exists() {
            let backup = self.backup_path(Utc::now());
            fs::rename(&current, &backup).map_err(io_err(&current))?;
            info!(backup = %backup.display(), "backed up current preset");
            Some(backup)
        } else {
            None
        };

        fs::rename(&tmp, &current).map_err(io_err(&current))?;
        info!(path = %current.display(), "promoted candidate to current");
        Ok(Promotion::Promoted { backup })
    }

    /// Backups, oldest first: by timestamp, then by same-second suffix.
    pub fn backups(&self) -> Result<Vec<PathBuf>, PresetError> {
        let entries = fs::read_dir(&self.dir).map_err(io_err(&self.dir))?;
        let mut out = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_err(&self.dir))?.path();
            let key = path.file_name().and_then(|n| n.to_str()).and_then(backup_order);
            if let Some(key) = key {
                out.push((key, path));
            }
        }
        out.sort();
        Ok(out.into_iter().map(|(_, path)| path).collect())
    }

    pub fn compare_presets(&self) -> Result<PresetComparison, PresetError> {
        let current = self.load_current()?;
        let candidate = self.load_candidate()?;
        let metrics_diff = current
            .metrics
            .entries()
            .into_iter()
            .zip(candidate.metrics.entries())
            .map(|((key, cur), (_, cand))| MetricDiff {
                key,
                current: cur,
                candidate: cand,
                diff: cand - cur,
                improvement_pct: if cur != 0.0 { (cand - cur) / cur * 100.0 } else { 0.0 },
            })
            .collect();
        Ok(PresetComparison {
            current,
            candidate,
            metrics_diff,
        })
    }

    /// First free `preset_A_backup_<YYYYmmdd_HHMMSS>[_N].json`.
    fn backup_path(&self, now: DateTime<Utc>) -> PathBuf {
        let stamp = now.format("%Y%m%d_%H%M%S");
        let mut path = self.dir.join(format!("{BACKUP_PREFIX}{stamp}.json"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{BACKUP_PREFIX}{stamp}_{n}.json"));
            n += 1;
        }
        path
    }
}

/// `(timestamp, n)` for `preset_A_backup_<stamp>[_n].json`; an unsuffixed
/// backup is `n = 0`.
fn backup_order(file_name: &str) -> Option<(String, u32)> {
    let rest = file_name.strip_prefix(BACKUP_PREFIX)?.strip_suffix(".json")?;
    // The stamp itself contains one underscore: YYYYmmdd_HHMMSS.
    match rest.rsplit_once('_') {
        Some((stamp, n)) if stamp.contains('_') => Some((stamp.to_string(), n.parse().ok()?)),
        _ => Some((rest.to_string(), 0)),
    }
}

fn load_or_default(path: &Path) -> Result<Preset, PresetError> {
    if !path.exists() {
        warn!(path = %path.display(), "preset not found, using default");
        return Ok(Preset::default());
    }
    let content = fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&content).map_err(|source| PresetError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn save(preset: &Preset, path: &Path) -> Result<(), PresetError> {
    let json = serde_json::to_string_pretty(preset)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;
    info!(path = %path.display(), version = %preset.version, "preset saved");
    Ok(())
}
