use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, RawPayload, Source};

pub const INGEST_PATH: &str = "/ingest/meter_payload";

#[derive(Clone)]
struct SharedSender {
    tx: mpsc::Sender<Envelope<RawPayload>>,
    auth_bearer_token: Option<Arc<str>>,
}

/// HTTP source of raw meter messages.
///
/// `POST /ingest/meter_payload` accepts a single JSON object or an array of
/// objects. Messages are queued as-is; normalization happens downstream.
#[derive(Clone)]
pub struct HttpJsonSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<RawPayload>>>>>,
}

impl HttpJsonSource {
    pub async fn new(
        bind_addr: &str,
        channel_capacity: usize,
        auth_bearer_token: Option<String>,
    ) -> Result<Self, PipelineError> {
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;

        let (app, source) = Self::router(channel_capacity, auth_bearer_token);

        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    tracing::info!(%addr, "HTTP payload source listening");
                    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                        tracing::error!(error = %e, "HTTP payload source server error");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to bind HTTP payload source listener");
                }
            }
        });

        Ok(source)
    }

    /// Router and source sharing one channel, without binding a listener.
    pub fn router(channel_capacity: usize, auth_bearer_token: Option<String>) -> (Router, Self) {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let shared = SharedSender {
            tx,
            auth_bearer_token: auth_bearer_token.map(Arc::from),
        };

        let app = Router::new()
            .route(INGEST_PATH, post(ingest_meter_payload))
            .with_state(shared);

        let source = Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        };
        (app, source)
    }
}

#[async_trait::async_trait]
impl Source<RawPayload> for HttpJsonSource {
    async fn stream(&self) -> EnvelopeStream<RawPayload> {
        let mut guard = self.receiver.lock().await;
        match guard.take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx).map(Ok)),
            None => Box::pin(futures::stream::once(async {
                Err::<Envelope<RawPayload>, _>(PipelineError::Source(
                    "HttpJsonSource stream already taken; only one consumer supported".to_string(),
                ))
            })),
        }
    }
}

fn authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

async fn ingest_meter_payload(
    State(sender): State<SharedSender>,
    headers: HeaderMap,
    Json(body): Json<RawPayload>,
) -> Result<StatusCode, StatusCode> {
    metrics::counter!("http_ingest_requests_total").increment(1);

    if !authorized(sender.auth_bearer_token.as_deref(), &headers) {
        metrics::counter!("http_ingest_unauthorized_total").increment(1);
        return Err(StatusCode::UNAUTHORIZED);
    }

    let payloads = match body {
        RawPayload::Array(items) => items,
        single @ RawPayload::Object(_) => vec![single],
        _ => return Err(StatusCode::UNPROCESSABLE_ENTITY),
    };

    for payload in payloads {
        if let Err(_e) = sender.tx.send(Envelope::now(payload)).await {
            // Channel closed; treat as server error
            metrics::counter!("http_ingest_failed_total").increment(1);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    Ok(StatusCode::ACCEPTED)
}
