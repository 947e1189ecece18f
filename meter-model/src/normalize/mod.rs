//! Raw meter payload → [`SensorReading`].
//!
//! The meter kind is taken from the top-level key (`electricitymeter` wins
//! over `gasmeter`), then the nested meter data is read through the shape in
//! [`shape`]. Validation is all-or-nothing: any unreadable field rejects the
//! whole message.

mod error;
mod shape;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::{Map, Value};
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    OffsetDateTime,
};

use crate::domain::{decimal::DecimalText, SensorName, SensorReading};

pub use error::{NormalizeError, SchemaError, ValidationError};
use shape::{Counters, MeterData};

/// Units assumed when a power block omits them.
pub const DEFAULT_POWER_UNITS: &str = "kW";

const IMPORT_FIELDS: [&str; 4] = [
    "energy.import.cumulative",
    "energy.import.day",
    "energy.import.week",
    "energy.import.month",
];
const EXPORT_FIELDS: [&str; 4] = [
    "energy.export.cumulative",
    "energy.export.day",
    "energy.export.week",
    "energy.export.month",
];

/// Normalize a raw payload. Fails with [`SchemaError::NotAnObject`] unless
/// `raw` is a JSON object.
pub fn normalize(raw: &Value) -> Result<SensorReading, NormalizeError> {
    let fields = raw.as_object().ok_or(SchemaError::NotAnObject)?;
    normalize_map(fields)
}

fn normalize_map(raw: &Map<String, Value>) -> Result<SensorReading, NormalizeError> {
    let (sensor_name, meter_data) = SensorName::ALL
        .into_iter()
        .find_map(|name| raw.get(name.payload_key()).map(|data| (name, data)))
        .ok_or(SchemaError::UnrecognizedMeter)?;

    let data = MeterData::deserialize(meter_data).map_err(|e| ValidationError::Malformed {
        reason: format!("{}: {e}", sensor_name.payload_key()),
    })?;

    let read_at = parse_timestamp(data.timestamp.as_deref())?;

    let energy = data.energy.unwrap_or_default();
    let import = energy.import.unwrap_or_default();
    let export = energy.export.unwrap_or_default();
    let [import_cumulative, import_day, import_week, import_month] =
        counters(IMPORT_FIELDS, import)?;
    let [export_cumulative, export_day, export_week, export_month] =
        counters(EXPORT_FIELDS, export)?;

    // Units default only when the meter reported a power block at all.
    let (power_value, power_units) = match data.power {
        Some(power) => (
            decimal("power.value", power.value)?,
            Some(power.units.unwrap_or_else(|| DEFAULT_POWER_UNITS.to_string())),
        ),
        None => (None, None),
    };

    Ok(SensorReading {
        read_at,
        sensor_name,
        import_cumulative,
        import_day,
        import_week,
        import_month,
        export_cumulative,
        export_day,
        export_week,
        export_month,
        power_value,
        power_units,
        voltage: decimal("voltage", data.voltage)?,
        current: decimal("current", data.current)?,
        frequency: decimal("frequency", data.frequency)?,
        power_factor: decimal("power_factor", data.power_factor)?,
    })
}

fn parse_timestamp(value: Option<&str>) -> Result<OffsetDateTime, ValidationError> {
    let text = value.ok_or(ValidationError::MissingTimestamp)?;
    OffsetDateTime::parse(text, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(text, &Iso8601::DEFAULT))
        .map_err(|e| ValidationError::InvalidTimestamp {
            value: text.to_string(),
            reason: e.to_string(),
        })
}

fn counters(
    fields: [&'static str; 4],
    counters: Counters,
) -> Result<[Option<BigDecimal>; 4], ValidationError> {
    let [cumulative, day, week, month] = fields;
    Ok([
        decimal(cumulative, counters.cumulative)?,
        decimal(day, counters.day)?,
        decimal(week, counters.week)?,
        decimal(month, counters.month)?,
    ])
}

fn decimal(
    field: &'static str,
    text: Option<DecimalText>,
) -> Result<Option<BigDecimal>, ValidationError> {
    text.map(|t| {
        t.parse().ok_or_else(|| ValidationError::InvalidDecimal {
            field,
            value: t.into_string(),
        })
    })
    .transpose()
}
