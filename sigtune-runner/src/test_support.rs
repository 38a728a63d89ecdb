use chrono::{Duration, TimeZone, Utc};
use sigtune_core::domain::{EmittedParams, FeatureSet, SignalType};
use sigtune_core::view::{HorizonOutcome, LabeledRow};

/// Row `id` hours after 2024-01-01 with the same forward return at every
/// horizon.
pub(crate) fn row(
    id: u64,
    signal_type: SignalType,
    features: FeatureSet,
    fwd_ret: f64,
) -> LabeledRow {
    let outcome = HorizonOutcome {
        fwd_ret,
        broke_high: false,
        broke_low: false,
    };
    LabeledRow {
        signal_id: id,
        ts: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(id as i64),
        symbol: "BTCUSDT".into(),
        timeframe: "1h".into(),
        signal_type,
        features,
        params: EmittedParams::default(),
        outcomes: [outcome; 4],
    }
}

pub(crate) fn rsi_row(id: u64, rsi: f64, fwd_ret: f64) -> LabeledRow {
    row(
        id,
        SignalType::Buy,
        FeatureSet {
            rsi,
            ..FeatureSet::default()
        },
        fwd_ret,
    )
}
