//! Domain types for signal tuning

pub mod experiment;
pub mod features;
pub mod ids;
pub mod label;
pub mod params;
pub mod signal;

pub use experiment::Experiment;
pub use features::{
    CreditRegime, EmittedParams, FeatureSet, MacroFeatures, Trend, DEFAULT_RSI, DEFAULT_VIX,
    DEFAULT_VOL_MULT,
};
pub use ids::{DatasetHash, RunId};
pub use label::{Horizon, Label, UnsupportedHorizon, BREAKOUT_BAND};
pub use params::{ParamValue, ParamVector};
pub use signal::{BarSnapshot, Bias, ParseSignalTypeError, Signal, SignalType};
