//! Search space — named, bounded dimensions the optimizer explores.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sigtune_core::domain::{ParamValue, ParamVector};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpaceError {
    #[error("search space has no dimensions")]
    Empty,

    #[error("dimension '{0}' declared more than once")]
    DuplicateName(String),

    #[error("dimension '{name}': lower bound {low} exceeds upper bound {high}")]
    InvalidBounds { name: String, low: f64, high: f64 },

    #[error("dimension '{0}': bounds must be finite")]
    NonFiniteBounds(String),
}

/// One dimension, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Dimension {
    Float { name: String, low: f64, high: f64 },
    Int { name: String, low: i64, high: i64 },
}

impl Dimension {
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Dimension::Float { name: name.into(), low, high }
    }

    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Dimension::Int { name: name.into(), low, high }
    }

    pub fn name(&self) -> &str {
        match self {
            Dimension::Float { name, .. } | Dimension::Int { name, .. } => name,
        }
    }

    /// Bounds widened to f64.
    pub fn range(&self) -> (f64, f64) {
        match *self {
            Dimension::Float { low, high, .. } => (low, high),
            Dimension::Int { low, high, .. } => (low as f64, high as f64),
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Dimension::Int { .. })
    }

    /// Map a raw draw onto this dimension: clamp, and round integers.
    pub fn value_from(&self, raw: f64) -> ParamValue {
        match *self {
            Dimension::Float { low, high, .. } => ParamValue::Float(raw.clamp(low, high)),
            Dimension::Int { low, high, .. } => {
                ParamValue::Int((raw.round() as i64).clamp(low, high))
            }
        }
    }

    pub fn contains(&self, value: ParamValue) -> bool {
        match (self, value) {
            (Dimension::Float { low, high, .. }, v) => {
                let x = v.as_f64();
                x >= *low && x <= *high
            }
            (Dimension::Int { low, high, .. }, ParamValue::Int(x)) => x >= *low && x <= *high,
            (Dimension::Int { .. }, ParamValue::Float(_)) => false,
        }
    }

    fn validate(&self) -> Result<(), SpaceError> {
        let (low, high) = self.range();
        if !low.is_finite() || !high.is_finite() {
            return Err(SpaceError::NonFiniteBounds(self.name().to_string()));
        }
        if low > high {
            return Err(SpaceError::InvalidBounds {
                name: self.name().to_string(),
                low,
                high,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    dims: Vec<Dimension>,
}

impl SearchSpace {
    pub fn new(dims: Vec<Dimension>) -> Self {
        Self { dims }
    }

    /// The 17-dimension space tuned in production: filter thresholds,
    /// score weights, hysteresis/cooldown bar counts and macro weights.
    pub fn reference() -> Self {
        Self::new(vec![
            Dimension::float("rsi_buy_th", 50.0, 70.0),
            Dimension::float("rsi_sell_th", 30.0, 50.0),
            Dimension::float("vol_mult_buy", 1.0, 3.0),
            Dimension::float("vol_mult_sell", 1.0, 3.0),
            Dimension::float("vcp_ratio_th", 0.1, 0.8),
            Dimension::float("dist_ath_max", 0.05, 0.3),
            Dimension::float("alpha", 0.5, 1.0),
            Dimension::float("beta", 0.1, 0.6),
            Dimension::float("gamma", 0.3, 1.0),
            Dimension::float("delta", 0.2, 0.8),
            Dimension::float("epsilon", 0.5, 1.0),
            Dimension::int("hysteresis_len", 2, 5),
            Dimension::int("cooldown_bars", 2, 5),
            Dimension::float("vix_w", -0.5, 0.0),
            Dimension::float("dxy_w", -0.5, 0.0),
            Dimension::float("us10y_w", -0.5, 0.0),
            Dimension::float("hygief_w", 0.0, 0.6),
        ])
    }

    /// Check every dimension. Must pass before the first trial runs.
    pub fn validate(&self) -> Result<(), SpaceError> {
        if self.dims.is_empty() {
            return Err(SpaceError::Empty);
        }
        let mut seen = HashSet::new();
        for dim in &self.dims {
            if !seen.insert(dim.name()) {
                return Err(SpaceError::DuplicateName(dim.name().to_string()));
            }
            dim.validate()?;
        }
        Ok(())
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Whether `params` has exactly this space's names, each within bounds.
    pub fn contains(&self, params: &ParamVector) -> bool {
        params.len() == self.dims.len()
            && self
                .dims
                .iter()
                .all(|d| params.get(d.name()).is_some_and(|v| d.contains(v)))
    }
}
