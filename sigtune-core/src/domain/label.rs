//! Label — realized outcome of a signal at one forward horizon.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Breakout band used by the labeler for `broke_high` / `broke_low`.
pub const BREAKOUT_BAND: f64 = 0.03;

/// Forward horizon in bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Horizon {
    H3,
    H5,
    H10,
    H20,
}

impl Horizon {
    pub const ALL: [Horizon; 4] = [Horizon::H3, Horizon::H5, Horizon::H10, Horizon::H20];

    pub fn bars(&self) -> u32 {
        match self {
            Horizon::H3 => 3,
            Horizon::H5 => 5,
            Horizon::H10 => 10,
            Horizon::H20 => 20,
        }
    }

    /// Position in [`Horizon::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Horizon::H3 => 0,
            Horizon::H5 => 1,
            Horizon::H10 => 2,
            Horizon::H20 => 3,
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bars())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported horizon {0} (expected 3, 5, 10 or 20)")]
pub struct UnsupportedHorizon(pub u32);

impl TryFrom<u32> for Horizon {
    type Error = UnsupportedHorizon;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            3 => Ok(Horizon::H3),
            5 => Ok(Horizon::H5),
            10 => Ok(Horizon::H10),
            20 => Ok(Horizon::H20),
            other => Err(UnsupportedHorizon(other)),
        }
    }
}

impl From<Horizon> for u32 {
    fn from(h: Horizon) -> u32 {
        h.bars()
    }
}

/// At most one label exists per `(signal_id, horizon)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub signal_id: u64,
    pub horizon: Horizon,
    pub fwd_ret: f64,
    pub broke_high: bool,
    pub broke_low: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_serializes_as_bar_count() {
        assert_eq!(serde_json::to_string(&Horizon::H10).unwrap(), "10");
        let h: Horizon = serde_json::from_str("20").unwrap();
        assert_eq!(h, Horizon::H20);
    }

    #[test]
    fn unsupported_horizon_rejected() {
        assert!(serde_json::from_str::<Horizon>("7").is_err());
        assert_eq!(Horizon::try_from(7), Err(UnsupportedHorizon(7)));
    }

    #[test]
    fn index_matches_all_order() {
        for (i, h) in Horizon::ALL.iter().enumerate() {
            assert_eq!(h.index(), i);
        }
    }
}
