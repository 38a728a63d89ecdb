//! Parameter samplers behind a swappable interface.
//!
//! A sampler proposes the next vector and is told each result through
//! [`ParamSampler::update`]. It keeps its own history, so it can be driven and
//! tested without a search loop.
//!
//! [`TpeSampler`] is a tree-structured Parzen estimator with independent
//! per-dimension densities. Trials are ranked by score (`+inf` above every
//! finite value, earlier trial first on ties); the top fraction forms the
//! "good" density l(x), the rest the "bad" density g(x). Candidates are drawn
//! from l(x) and the one maximizing l(x)/g(x) is proposed.
//!
//! All randomness for trial `n` comes from the `("trial", n)` stream of the
//! RNG hierarchy.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sigtune_core::domain::ParamVector;
use sigtune_core::rng::RngHierarchy;

use crate::space::{Dimension, SearchSpace};

const TRIAL_STREAM: &str = "trial";

pub trait ParamSampler {
    /// Propose the vector for trial `trial_number` (0-based).
    fn propose(&mut self, space: &SearchSpace, trial_number: usize) -> ParamVector;

    /// Record the score of a vector returned by `propose`.
    fn update(&mut self, params: &ParamVector, score: f64);

    fn name(&self) -> &'static str;
}

// ─── Random ──────────────────────────────────────────────────────────

/// Independent uniform draws in every dimension.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: RngHierarchy,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self { rng: RngHierarchy::new(seed) }
    }
}

fn sample_uniform(space: &SearchSpace, rng: &mut StdRng) -> ParamVector {
    space
        .dims()
        .iter()
        .map(|dim| {
            let value = match *dim {
                Dimension::Float { low, high, .. } => dim.value_from(low + rng.gen::<f64>() * (high - low)),
                Dimension::Int { low, high, .. } => dim.value_from(rng.gen_range(low..=high) as f64),
            };
            (dim.name().to_string(), value)
        })
        .collect()
}

impl ParamSampler for RandomSampler {
    fn propose(&mut self, space: &SearchSpace, trial_number: usize) -> ParamVector {
        let mut rng = self.rng.rng_for(TRIAL_STREAM, trial_number as u64);
        sample_uniform(space, &mut rng)
    }

    fn update(&mut self, _params: &ParamVector, _score: f64) {}

    fn name(&self) -> &'static str {
        "random"
    }
}

// ─── TPE ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TpeConfigError {
    #[error("gamma_fraction must be in (0, 1], got {0}")]
    Gamma(f64),
    #[error("n_ei_candidates must be at least 1")]
    NoCandidates,
    #[error("max_good must be at least 1")]
    MaxGood,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TpeConfig {
    /// Purely random trials before the density model kicks in.
    pub n_startup_trials: usize,
    /// Candidates drawn from l(x) per dimension per proposal.
    pub n_ei_candidates: usize,
    /// Share of ranked trials treated as good.
    pub gamma_fraction: f64,
    /// Upper bound on the good set size.
    pub max_good: usize,
}

impl Default for TpeConfig {
    fn default() -> Self {
        Self {
            n_startup_trials: 10,
            n_ei_candidates: 24,
            gamma_fraction: 0.1,
            max_good: 25,
        }
    }
}

impl TpeConfig {
    pub fn validate(&self) -> Result<(), TpeConfigError> {
        if !(self.gamma_fraction > 0.0 && self.gamma_fraction <= 1.0) {
            return Err(TpeConfigError::Gamma(self.gamma_fraction));
        }
        if self.n_ei_candidates == 0 {
            return Err(TpeConfigError::NoCandidates);
        }
        if self.max_good == 0 {
            return Err(TpeConfigError::MaxGood);
        }
        Ok(())
    }

    /// Size of the good set for `n` completed trials: `ceil(γ·n)`, at least 1,
    /// at most `max_good`.
    pub fn n_good(&self, n: usize) -> usize {
        let raw = (self.gamma_fraction * n as f64).ceil() as usize;
        raw.clamp(1, self.max_good).min(n)
    }
}

#[derive(Debug, Clone)]
pub struct TpeSampler {
    config: TpeConfig,
    rng: RngHierarchy,
    history: Vec<(ParamVector, f64)>,
}

impl TpeSampler {
    pub fn new(seed: u64, config: TpeConfig) -> Self {
        Self {
            config,
            rng: RngHierarchy::new(seed),
            history: Vec::new(),
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// History indices ordered best first; ties keep trial order.
    fn ranked(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.history.len()).collect();
        idx.sort_by(|&a, &b| rank_scores(self.history[a].1, self.history[b].1).then(a.cmp(&b)));
        idx
    }

    fn suggest(&self, dim: &Dimension, good: &[usize], bad: &[usize], rng: &mut StdRng) -> f64 {
        let (low, high) = match dim {
            Dimension::Float { low, high, .. } => (*low, *high),
            Dimension::Int { low, high, .. } => (*low as f64 - 0.5, *high as f64 + 0.5),
        };
        if high <= low {
            return low;
        }

        let observed = |set: &[usize]| -> Vec<f64> {
            set.iter()
                .filter_map(|&i| self.history[i].0.get_f64(dim.name()))
                .collect()
        };
        let l = ParzenEstimator::new(&observed(good), low, high);
        let g = ParzenEstimator::new(&observed(bad), low, high);

        let mut best = f64::NAN;
        let mut best_gain = f64::NEG_INFINITY;
        for _ in 0..self.config.n_ei_candidates {
            let x = l.sample(rng);
            let gain = l.log_pdf(x) - g.log_pdf(x);
            if best.is_nan() || gain > best_gain {
                best = x;
                best_gain = gain;
            }
        }
        best
    }
}

impl ParamSampler for TpeSampler {
    fn propose(&mut self, space: &SearchSpace, trial_number: usize) -> ParamVector {
        let mut rng = self.rng.rng_for(TRIAL_STREAM, trial_number as u64);
        if self.history.len() < self.config.n_startup_trials.max(1) {
            return sample_uniform(space, &mut rng);
        }

        let ranked = self.ranked();
        let (good, bad) = ranked.split_at(self.config.n_good(ranked.len()));

        space
            .dims()
            .iter()
            .map(|dim| {
                let raw = self.suggest(dim, good, bad, &mut rng);
                (dim.name().to_string(), dim.value_from(raw))
            })
            .collect()
    }

    fn update(&mut self, params: &ParamVector, score: f64) {
        self.history.push((params.clone(), score));
    }

    fn name(&self) -> &'static str {
        "tpe"
    }
}

/// Higher score first. `+inf` outranks every finite score.
pub fn rank_scores(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

// ─── Parzen estimator ────────────────────────────────────────────────

/// Mixture of truncated Gaussians on `[low, high]`: one per observation plus
/// a wide prior centred on the interval.
#[derive(Debug, Clone)]
struct ParzenEstimator {
    low: f64,
    high: f64,
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    /// Log of each component's truncated mass, for normalization.
    log_mass: Vec<f64>,
}

impl ParzenEstimator {
    fn new(observations: &[f64], low: f64, high: f64) -> Self {
        let range = high - low;
        let prior_mu = 0.5 * (low + high);

        let mut mus: Vec<f64> = observations
            .iter()
            .copied()
            .filter(|x| x.is_finite())
            .map(|x| x.clamp(low, high))
            .collect();
        mus.push(prior_mu);
        mus.sort_by(|a, b| a.total_cmp(b));

        let n = mus.len();
        let max_sigma = range;
        let min_sigma = range / (n as f64 + 1.0).min(100.0);

        let mut prior_seen = false;
        let sigmas: Vec<f64> = (0..n)
            .map(|i| {
                if !prior_seen && mus[i] == prior_mu {
                    prior_seen = true;
                    return max_sigma;
                }
                let left = if i == 0 { mus[i] - low } else { mus[i] - mus[i - 1] };
                let right = if i + 1 == n { high - mus[i] } else { mus[i + 1] - mus[i] };
                left.max(right).clamp(min_sigma, max_sigma)
            })
            .collect();

        let log_mass = mus
            .iter()
            .zip(&sigmas)
            .map(|(&mu, &sigma)| {
                let mass = normal_cdf((high - mu) / sigma) - normal_cdf((low - mu) / sigma);
                mass.max(1e-12).ln()
            })
            .collect();

        Self { low, high, mus, sigmas, log_mass }
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        let k = rng.gen_range(0..self.mus.len());
        let (mu, sigma) = (self.mus[k], self.sigmas[k]);
        for _ in 0..64 {
            let x = mu + sigma * standard_normal(rng);
            if x >= self.low && x <= self.high {
                return x;
            }
        }
        mu
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let log_w = -(self.mus.len() as f64).ln();
        let terms: Vec<f64> = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .zip(&self.log_mass)
            .map(|((&mu, &sigma), &log_mass)| {
                let z = (x - mu) / sigma;
                log_w - 0.5 * z * z - sigma.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln() - log_mass
            })
            .collect();
        log_sum_exp(&terms)
    }
}

fn log_sum_exp(terms: &[f64]) -> f64 {
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

/// Box–Muller draw from N(0, 1).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz–Stegun 7.1.26, |error| < 1.5e-7.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}
