use std::{path::Path, time::SystemTime};

use meter_model::NormalizeError;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::{
    fs::OpenOptions,
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::pipeline::{PipelineError, RawPayload};

#[derive(Serialize)]
struct DeadLetter<'a> {
    kind: &'static str,
    error: String,
    #[serde(with = "time::serde::rfc3339")]
    received_at: OffsetDateTime,
    payload: &'a RawPayload,
}

/// Appends rejected raw messages, with the reason, as NDJSON.
pub struct DeadLetterWriter {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl DeadLetterWriter {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub async fn append_to(path: &Path) -> Result<Self, PipelineError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| {
                PipelineError::Sink(format!(
                    "failed to open dead-letter file {}: {e}",
                    path.display()
                ))
            })?;
        Ok(Self::new(Box::new(file)))
    }

    pub async fn write(
        &self,
        error: &NormalizeError,
        payload: &RawPayload,
        received_at: SystemTime,
    ) -> Result<(), PipelineError> {
        let record = DeadLetter {
            kind: error.kind(),
            error: error.to_string(),
            received_at: OffsetDateTime::from(received_at),
            payload,
        };
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| PipelineError::Sink(format!("failed to encode dead letter: {e}")))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| PipelineError::Sink(format!("failed to write dead letter: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| PipelineError::Sink(format!("failed to flush dead letters: {e}")))?;

        metrics::counter!("dead_letter_written_total", "kind" => error.kind()).increment(1);
        Ok(())
    }
}
