use std::path::PathBuf;

use async_stream::stream;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, RawPayload, Source};

/// NDJSON source of raw meter messages, one JSON document per line.
///
/// Blank lines are skipped. A line that is not valid JSON is reported as an
/// `Err` item and reading continues with the next line.
pub struct RawPayloadFileSource {
    path: PathBuf,
}

impl RawPayloadFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Source<RawPayload> for RawPayloadFileSource {
    async fn stream(&self) -> EnvelopeStream<RawPayload> {
        let path = self.path.clone();
        let s = stream! {
            let file = match File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    yield Err(PipelineError::Source(format!(
                        "failed to open payload file {}: {e}",
                        path.display()
                    )));
                    return;
                }
            };
            let mut lines = BufReader::new(file).lines();
            let mut line_no: u64 = 0;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(PipelineError::Source(format!(
                            "failed to read payload line: {e}"
                        )));
                        break;
                    }
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<RawPayload>(&line) {
                    Ok(payload) => yield Ok(Envelope::now(payload)),
                    Err(e) => {
                        metrics::counter!("raw_payload_file_parse_errors_total").increment(1);
                        yield Err(PipelineError::Source(format!(
                            "line {line_no}: invalid JSON: {e}"
                        )));
                    }
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    #[tokio::test]
    async fn file_source_yields_payloads_and_reports_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"gasmeter": {{"timestamp": "2024-01-01T00:00:00Z"}}}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(
            file,
            r#"{{"electricitymeter": {{"energy": {{"import": {{"cumulative": 1.10}}}}}}}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let source = RawPayloadFileSource::new(file.path());
        let items: Vec<_> = source.stream().await.collect().await;

        assert_eq!(items.len(), 3);
        assert!(items[0].as_ref().unwrap().payload.get("gasmeter").is_some());
        match &items[1] {
            Err(PipelineError::Source(msg)) => assert!(msg.starts_with("line 3:"), "{msg}"),
            other => panic!("expected source error, got {other:?}"),
        }
        let last = &items[2].as_ref().unwrap().payload;
        assert_eq!(
            last["electricitymeter"]["energy"]["import"]["cumulative"].to_string(),
            "1.10"
        );
    }

    #[tokio::test]
    async fn missing_file_yields_single_error() {
        let source = RawPayloadFileSource::new("/nonexistent/payloads.ndjson");
        let items: Vec<_> = source.stream().await.collect().await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(PipelineError::Source(_))));
    }
}
