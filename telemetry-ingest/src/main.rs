use anyhow::Result;
use telemetry_ingest::{
    config::{AppConfig, SourceKind},
    metrics_server,
    observability,
    runner,
    sources::{HttpJsonSource, RawPayloadFileSource},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let cfg = AppConfig::load()?;

    observability::init_tracing(&cfg.logging)?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let src = &cfg.source;
    match src.kind {
        SourceKind::Http => {
            let source = HttpJsonSource::new(
                &src.http_bind_addr,
                src.channel_capacity,
                src.auth_bearer_token.clone(),
            )
            .await?;
            runner::run(source, &cfg.sink, &cfg.validation).await?;
        }
        SourceKind::File => {
            let path = src
                .path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("source.path is required for file sources"))?;
            runner::run(RawPayloadFileSource::new(path), &cfg.sink, &cfg.validation).await?;
        }
    }

    Ok(())
}
