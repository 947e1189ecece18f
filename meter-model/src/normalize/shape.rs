//! Shape contract of the `meter_data` object found under a meter key.
//!
//! Every key is optional here; which ones are required is decided by the
//! normalizer. Unknown keys are ignored.

use serde::Deserialize;

use crate::domain::decimal::DecimalText;

#[derive(Debug, Deserialize)]
pub(super) struct MeterData {
    pub timestamp: Option<String>,
    pub energy: Option<EnergyBlock>,
    pub power: Option<PowerBlock>,
    pub voltage: Option<DecimalText>,
    pub current: Option<DecimalText>,
    pub frequency: Option<DecimalText>,
    pub power_factor: Option<DecimalText>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct EnergyBlock {
    pub import: Option<Counters>,
    pub export: Option<Counters>,
}

/// Register totals over the periods a meter reports.
#[derive(Debug, Default, Deserialize)]
pub(super) struct Counters {
    pub cumulative: Option<DecimalText>,
    pub day: Option<DecimalText>,
    pub week: Option<DecimalText>,
    pub month: Option<DecimalText>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PowerBlock {
    pub value: Option<DecimalText>,
    pub units: Option<String>,
}
