//! Assembly of the normalization pipeline from configuration, shared by the
//! service binary and the offline file tool.

use std::sync::Arc;

use meter_model::SensorReading;

use crate::{
    config::{SinkConfig, ValidationConfig},
    pipeline::{Pipeline, PipelineError, RawPayload, Source, Transform},
    sinks::{DeadLetterWriter, NdjsonSink},
    transform::{PayloadNormalization, ReadingValidation},
};

pub fn reading_transforms(
    cfg: &ValidationConfig,
) -> Vec<Arc<dyn Transform<SensorReading, SensorReading> + Send + Sync>> {
    if cfg.enabled {
        vec![Arc::new(ReadingValidation)]
    } else {
        Vec::new()
    }
}

pub async fn build_sink(cfg: &SinkConfig) -> Result<NdjsonSink, PipelineError> {
    let sink = match &cfg.path {
        Some(path) => NdjsonSink::append_to(path, cfg.batch_size).await?,
        None => NdjsonSink::stdout(cfg.batch_size),
    };
    match &cfg.dead_letter_path {
        Some(path) => Ok(sink.with_dead_letter(DeadLetterWriter::append_to(path).await?)),
        None => Ok(sink),
    }
}

/// Run `source` through normalization, the configured checks and the NDJSON
/// sink until the source is exhausted.
pub async fn run<S>(
    source: S,
    sink: &SinkConfig,
    validation: &ValidationConfig,
) -> Result<(), PipelineError>
where
    S: Source<RawPayload> + Send + Sync + 'static,
{
    let pipeline: Pipeline<_, RawPayload, SensorReading, _> = Pipeline {
        source,
        normalizer: Arc::new(PayloadNormalization),
        transforms: reading_transforms(validation),
        sink: build_sink(sink).await?,
    };

    tracing::info!(
        validation = validation.enabled,
        dead_letter = sink.dead_letter_path.is_some(),
        "starting meter payload pipeline"
    );
    pipeline.run().await
}
