use std::{path::Path, time::SystemTime};

use futures::StreamExt;
use meter_model::SensorReading;
use serde::Serialize;
use tokio::{
    fs::OpenOptions,
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use super::DeadLetterWriter;
use crate::pipeline::{Envelope, PipelineError, Sink};

#[derive(Serialize)]
struct ReadingLine<'a> {
    event_id: String,
    #[serde(flatten)]
    reading: &'a SensorReading,
}

/// Writes normalized readings as NDJSON, one `{"event_id", ...reading}`
/// object per line.
///
/// Rejected payloads go to the dead-letter writer when one is attached; any
/// other upstream error, and any dead-letter write failure, is logged and
/// skipped. Only a failed flush of the output stops the sink.
pub struct NdjsonSink {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    batch_size: usize,
    dead_letter: Option<DeadLetterWriter>,
}

impl NdjsonSink {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>, batch_size: usize) -> Self {
        Self {
            writer: Mutex::new(writer),
            batch_size: batch_size.max(1),
            dead_letter: None,
        }
    }

    pub fn stdout(batch_size: usize) -> Self {
        Self::new(Box::new(tokio::io::stdout()), batch_size)
    }

    pub async fn append_to(path: &Path, batch_size: usize) -> Result<Self, PipelineError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| {
                PipelineError::Sink(format!("failed to open output file {}: {e}", path.display()))
            })?;
        Ok(Self::new(Box::new(file), batch_size))
    }

    pub fn with_dead_letter(mut self, dead_letter: DeadLetterWriter) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    async fn flush_batch(
        &self,
        buffer: &[u8],
        count: usize,
        oldest: Option<SystemTime>,
    ) -> Result<(), PipelineError> {
        if count == 0 {
            return Ok(());
        }

        let mut writer = self.writer.lock().await;
        let res = match writer.write_all(buffer).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = res {
            tracing::error!(error = %e, "ndjson sink flush failed");
            metrics::counter!("ndjson_sink_errors_total").increment(1);
            return Err(PipelineError::Sink(e.to_string()));
        }

        metrics::counter!("ndjson_sink_written_total").increment(count as u64);

        // Approximate end-to-end latency from earliest received_at to now.
        if let Some(min_received) = oldest {
            if let Ok(dur) = SystemTime::now().duration_since(min_received) {
                metrics::histogram!("ingest_end_to_end_latency_seconds")
                    .record(dur.as_secs_f64());
            }
        }

        Ok(())
    }
}

fn encode_line(env: &Envelope<SensorReading>, out: &mut Vec<u8>) -> Result<(), PipelineError> {
    let line = ReadingLine {
        event_id: env.payload.event_id(),
        reading: &env.payload,
    };
    serde_json::to_writer(&mut *out, &line)
        .map_err(|e| PipelineError::Sink(format!("failed to encode reading: {e}")))?;
    out.push(b'\n');
    Ok(())
}

#[async_trait::async_trait]
impl Sink<SensorReading> for NdjsonSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<SensorReading>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        let mut buffer: Vec<u8> = Vec::new();
        let mut pending = 0usize;
        let mut oldest: Option<SystemTime> = None;

        while let Some(item) = input.next().await {
            match item {
                Ok(env) => {
                    // A record that fails to encode leaves the buffer untouched.
                    let mark = buffer.len();
                    if let Err(e) = encode_line(&env, &mut buffer) {
                        buffer.truncate(mark);
                        tracing::error!(error = %e, "failed to encode reading, skipping");
                        metrics::counter!("ndjson_sink_encode_errors_total").increment(1);
                        continue;
                    }
                    pending += 1;
                    oldest = Some(oldest.map_or(env.received_at, |t| t.min(env.received_at)));

                    if pending >= self.batch_size {
                        self.flush_batch(&buffer, pending, oldest).await?;
                        buffer.clear();
                        pending = 0;
                        oldest = None;
                    }
                }
                Err(PipelineError::Rejected {
                    error,
                    payload,
                    received_at,
                }) => {
                    tracing::warn!(kind = error.kind(), error = %error, "meter payload rejected");
                    if let Some(dead_letter) = &self.dead_letter {
                        // Accepted readings still in the buffer must not be lost to a
                        // dead-letter failure.
                        if let Err(e) = dead_letter.write(&error, &payload, received_at).await {
                            tracing::error!(error = %e, "dead-letter write failed");
                            metrics::counter!("dead_letter_errors_total").increment(1);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for NdjsonSink");
                    metrics::counter!("ndjson_sink_upstream_errors_total").increment(1);
                }
            }
        }

        self.flush_batch(&buffer, pending, oldest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::normalize_payload;
    use serde_json::{json, Value};
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    struct DiskFull;

    impl AsyncWrite for DiskFull {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::other("disk full")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn writes_readings_and_dead_letters() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("readings.ndjson");
        let rejected = dir.path().join("rejected.ndjson");

        let sink = NdjsonSink::append_to(&out, 2)
            .await
            .unwrap()
            .with_dead_letter(DeadLetterWriter::append_to(&rejected).await.unwrap());

        let raws = vec![
            json!({"electricitymeter": {"timestamp": "2023-10-27T10:00:00Z",
                "energy": {"import": {"cumulative": "1234.5670"}}}}),
            json!({"watermeter": {"timestamp": "2023-10-27T10:00:00Z"}}),
            json!({"gasmeter": {"timestamp": "2024-01-01T00:00:00Z", "power": {"value": "1"}}}),
            json!({"gasmeter": {"timestamp": "yesterday"}}),
            json!({"gasmeter": {"timestamp": "2024-01-02T00:00:00Z"}}),
        ];
        let mut items: Vec<Result<Envelope<SensorReading>, PipelineError>> = raws
            .into_iter()
            .map(|raw| normalize_payload(Envelope::now(raw)))
            .collect();
        items.push(Err(PipelineError::Source("line 9: invalid JSON".to_string())));

        sink.run(futures::stream::iter(items)).await.unwrap();

        let written = lines(&out);
        assert_eq!(written.len(), 3);
        assert_eq!(written[0]["sensor_name"], "electricity");
        assert_eq!(written[0]["import_cumulative"], "1234.5670");
        assert_eq!(written[0]["event_id"].as_str().map(str::len), Some(64));
        assert_eq!(written[1]["power_units"], "kW");
        assert!(written[2]["power_units"].is_null());

        let dead = lines(&rejected);
        assert_eq!(dead.len(), 2);
        assert_eq!(dead[0]["kind"], "schema");
        assert_eq!(dead[0]["payload"]["watermeter"]["timestamp"], "2023-10-27T10:00:00Z");
        assert_eq!(dead[1]["kind"], "validation");
        assert!(dead[1]["error"].as_str().unwrap().contains("yesterday"));
    }

    #[tokio::test]
    async fn rejected_payloads_without_dead_letter_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("readings.ndjson");
        let sink = NdjsonSink::append_to(&out, 10).await.unwrap();

        let items = vec![normalize_payload(Envelope::now(json!({"nothing": {}})))];
        sink.run(futures::stream::iter(items)).await.unwrap();

        assert!(lines(&out).is_empty());
    }

    #[tokio::test]
    async fn dead_letter_failure_keeps_accepted_readings() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("readings.ndjson");
        let sink = NdjsonSink::append_to(&out, 10)
            .await
            .unwrap()
            .with_dead_letter(DeadLetterWriter::new(Box::new(DiskFull)));

        let items: Vec<_> = [
            json!({"gasmeter": {"timestamp": "2024-01-01T00:00:00Z"}}),
            json!({"gasmeter": {"timestamp": "2024-01-01T00:30:00Z"}}),
            json!({"watermeter": {"timestamp": "2024-01-01T00:45:00Z"}}),
            json!({"gasmeter": {"timestamp": "2024-01-01T01:00:00Z"}}),
        ]
        .into_iter()
        .map(|raw| normalize_payload(Envelope::now(raw)))
        .collect();

        sink.run(futures::stream::iter(items)).await.unwrap();

        let written = lines(&out);
        assert_eq!(written.len(), 3);
        assert_eq!(written[2]["read_at"], "2024-01-01T01:00:00Z");
    }
}
