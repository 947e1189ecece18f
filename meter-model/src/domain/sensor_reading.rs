use std::fmt;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::decimal;

/// Meter kind, derived from the top-level key of the raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorName {
    Electricity,
    Gas,
}

impl SensorName {
    /// Recognized meters in detection priority order.
    pub const ALL: [SensorName; 2] = [SensorName::Electricity, SensorName::Gas];

    /// Top-level key carrying this meter's data in a raw payload.
    pub const fn payload_key(self) -> &'static str {
        match self {
            Self::Electricity => "electricitymeter",
            Self::Gas => "gasmeter",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Gas => "gas",
        }
    }
}

impl fmt::Display for SensorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized meter reading.
///
/// Every numeric field is an exact decimal; `None` means the source message
/// did not carry the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(with = "time::serde::rfc3339")]
    pub read_at: OffsetDateTime,
    pub sensor_name: SensorName,

    #[serde(default, with = "decimal::option")]
    pub import_cumulative: Option<BigDecimal>,
    #[serde(default, with = "decimal::option")]
    pub import_day: Option<BigDecimal>,
    #[serde(default, with = "decimal::option")]
    pub import_week: Option<BigDecimal>,
    #[serde(default, with = "decimal::option")]
    pub import_month: Option<BigDecimal>,

    #[serde(default, with = "decimal::option")]
    pub export_cumulative: Option<BigDecimal>,
    #[serde(default, with = "decimal::option")]
    pub export_day: Option<BigDecimal>,
    #[serde(default, with = "decimal::option")]
    pub export_week: Option<BigDecimal>,
    #[serde(default, with = "decimal::option")]
    pub export_month: Option<BigDecimal>,

    #[serde(default, with = "decimal::option")]
    pub power_value: Option<BigDecimal>,
    #[serde(default)]
    pub power_units: Option<String>,

    #[serde(default, with = "decimal::option")]
    pub voltage: Option<BigDecimal>,
    #[serde(default, with = "decimal::option")]
    pub current: Option<BigDecimal>,
    #[serde(default, with = "decimal::option")]
    pub frequency: Option<BigDecimal>,
    #[serde(default, with = "decimal::option")]
    pub power_factor: Option<BigDecimal>,
}

impl SensorReading {
    /// Numeric fields paired with their column names, in declaration order.
    pub fn decimal_fields(&self) -> [(&'static str, Option<&BigDecimal>); 13] {
        [
            ("import_cumulative", self.import_cumulative.as_ref()),
            ("import_day", self.import_day.as_ref()),
            ("import_week", self.import_week.as_ref()),
            ("import_month", self.import_month.as_ref()),
            ("export_cumulative", self.export_cumulative.as_ref()),
            ("export_day", self.export_day.as_ref()),
            ("export_week", self.export_week.as_ref()),
            ("export_month", self.export_month.as_ref()),
            ("power_value", self.power_value.as_ref()),
            ("voltage", self.voltage.as_ref()),
            ("current", self.current.as_ref()),
            ("frequency", self.frequency.as_ref()),
            ("power_factor", self.power_factor.as_ref()),
        ]
    }

    /// Stable content hash of the reading, suitable as an idempotency key.
    ///
    /// Decimals are hashed by their exact text, so `500.0` and `500` produce
    /// different ids.
    pub fn event_id(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(&self.read_at.unix_timestamp_nanos().to_le_bytes());
        hash_str(&mut h, self.sensor_name.as_str());
        for (_, value) in self.decimal_fields() {
            hash_opt_str(&mut h, value.map(decimal::to_text).as_deref());
        }
        hash_opt_str(&mut h, self.power_units.as_deref());
        h.finalize().to_hex().to_string()
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    let len = s.len() as u32;
    hasher.update(&len.to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_opt_str(hasher: &mut blake3::Hasher, s: Option<&str>) {
    match s {
        Some(v) => {
            hasher.update(&[1]);
            hash_str(hasher, v);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}
