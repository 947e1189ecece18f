use bigdecimal::BigDecimal;
use meter_model::{normalize, SensorReading};
use time::macros::datetime;

use crate::pipeline::{Envelope, PipelineError, RawPayload, Transform};

/// Normalize one raw message, keeping the payload alongside the error on
/// failure.
pub fn normalize_payload(
    env: Envelope<RawPayload>,
) -> Result<Envelope<SensorReading>, PipelineError> {
    match normalize(&env.payload) {
        Ok(reading) => Ok(Envelope {
            payload: reading,
            received_at: env.received_at,
        }),
        Err(error) => Err(PipelineError::Rejected {
            error,
            payload: Box::new(env.payload),
            received_at: env.received_at,
        }),
    }
}

/// Plausibility checks on a normalized reading.
///
/// Rules:
/// - read_at must be within a broad sanity window [2000-01-01, 2100-01-01].
/// - cumulative totals must be non-negative.
pub fn validate_reading(
    env: Envelope<SensorReading>,
) -> Result<Envelope<SensorReading>, PipelineError> {
    let r = &env.payload;

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if r.read_at < min_ts || r.read_at > max_ts {
        return Err(PipelineError::Transform(format!(
            "{} reading timestamp {} out of allowed range",
            r.sensor_name, r.read_at
        )));
    }

    let zero = BigDecimal::from(0);
    for (name, value) in [
        ("import_cumulative", &r.import_cumulative),
        ("export_cumulative", &r.export_cumulative),
    ] {
        if value.as_ref().is_some_and(|v| *v < zero) {
            return Err(PipelineError::Transform(format!("{name} must be non-negative")));
        }
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct PayloadNormalization;

#[async_trait::async_trait]
impl Transform<RawPayload, SensorReading> for PayloadNormalization {
    async fn apply(
        &self,
        input: Envelope<RawPayload>,
    ) -> Result<Envelope<SensorReading>, PipelineError> {
        match normalize_payload(input) {
            Ok(env) => {
                let sensor = env.payload.sensor_name.as_str();
                metrics::counter!("normalize_accepted_total", "sensor" => sensor).increment(1);
                Ok(env)
            }
            Err(e) => {
                if let PipelineError::Rejected { error, .. } = &e {
                    metrics::counter!("normalize_rejected_total", "kind" => error.kind())
                        .increment(1);
                }
                Err(e)
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct ReadingValidation;

#[async_trait::async_trait]
impl Transform<SensorReading, SensorReading> for ReadingValidation {
    async fn apply(
        &self,
        input: Envelope<SensorReading>,
    ) -> Result<Envelope<SensorReading>, PipelineError> {
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_reading_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_model::{NormalizeError, SchemaError, SensorName};
    use serde_json::json;
    use std::str::FromStr;

    fn reading_env(raw: serde_json::Value) -> Envelope<SensorReading> {
        normalize_payload(Envelope::now(raw)).unwrap()
    }

    #[test]
    fn normalize_payload_keeps_received_at() {
        let env = Envelope::now(json!({"gasmeter": {"timestamp": "2024-01-01T00:00:00Z"}}));
        let received_at = env.received_at;

        let out = normalize_payload(env).unwrap();

        assert_eq!(out.payload.sensor_name, SensorName::Gas);
        assert_eq!(out.received_at, received_at);
    }

    #[test]
    fn normalize_payload_rejects_with_original_payload() {
        let raw = json!({"heatmeter": {"timestamp": "2024-01-01T00:00:00Z"}});

        let res = normalize_payload(Envelope::now(raw.clone()));

        match res {
            Err(PipelineError::Rejected { error, payload, .. }) => {
                assert_eq!(error, NormalizeError::Schema(SchemaError::UnrecognizedMeter));
                assert_eq!(*payload, raw);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn reading_validation_accepts_valid_record() {
        let env = reading_env(json!({"electricitymeter": {
            "timestamp": "2024-01-01T00:00:00Z",
            "energy": {"import": {"cumulative": "12.5"}, "export": {"cumulative": "0"}}
        }}));

        assert!(validate_reading(env).is_ok());
    }

    #[test]
    fn reading_validation_rejects_negative_cumulative() {
        let mut env =
            reading_env(json!({"electricitymeter": {"timestamp": "2024-01-01T00:00:00Z"}}));
        env.payload.export_cumulative = Some(BigDecimal::from_str("-0.001").unwrap());

        let res = validate_reading(env);
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn reading_validation_allows_negative_period_totals() {
        let env = reading_env(json!({"electricitymeter": {
            "timestamp": "2024-01-01T00:00:00Z",
            "energy": {"import": {"day": "-1.0"}}
        }}));

        assert!(validate_reading(env).is_ok());
    }

    #[test]
    fn reading_validation_rejects_out_of_range_ts() {
        let env = reading_env(json!({"gasmeter": {"timestamp": "1800-01-01T00:00:00Z"}}));

        let res = validate_reading(env);
        assert!(matches!(res, Err(PipelineError::Transform(_))));
    }

    #[tokio::test]
    async fn payload_normalization_transform_maps_payloads() {
        let t = PayloadNormalization;
        let raw = json!({"electricitymeter": {"timestamp": "2024-01-01T00:00:00Z"}});
        let ok = t.apply(Envelope::now(raw)).await;
        assert!(ok.is_ok());

        let err = t.apply(Envelope::now(json!({"electricitymeter": {}}))).await;
        assert!(matches!(err, Err(PipelineError::Rejected { .. })));
    }
}
