use anyhow::{bail, Result};
use std::{env, path::PathBuf};
use telemetry_ingest::{
    config::{LoggingConfig, SinkConfig, ValidationConfig},
    observability,
    runner,
    sources::RawPayloadFileSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing(&LoggingConfig::default())?;

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 4 {
        bail!("usage: normalize_file <payloads.ndjson> [readings.ndjson] [rejected.ndjson]");
    }

    let source = RawPayloadFileSource::new(&args[1]);
    let sink = SinkConfig {
        path: args.get(2).map(PathBuf::from),
        dead_letter_path: args.get(3).map(PathBuf::from),
        ..SinkConfig::default()
    };

    runner::run(source, &sink, &ValidationConfig::default()).await?;

    Ok(())
}
