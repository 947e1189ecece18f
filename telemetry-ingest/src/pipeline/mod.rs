use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};
use meter_model::NormalizeError;

/// A meter message as delivered, before normalization.
pub type RawPayload = serde_json::Value;

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
    /// The raw message could not be normalized; it travels with the error so
    /// the sink can dead-letter it.
    #[error("rejected payload: {error}")]
    Rejected {
        error: NormalizeError,
        payload: Box<RawPayload>,
        received_at: SystemTime,
    },
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// Source of `I`, one `I -> O` normalizer, then a chain of `O -> O` transforms
/// feeding the sink. Per-item failures travel downstream as `Err` items.
pub struct Pipeline<S, I, O, K> {
    pub source: S,
    pub normalizer: Arc<dyn Transform<I, O> + Send + Sync>,
    pub transforms: Vec<Arc<dyn Transform<O, O> + Send + Sync>>, // same-type transforms chain
    pub sink: K,
}

impl<S, I, O, K> Pipeline<S, I, O, K>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Source<I> + Send + Sync + 'static,
    K: Sink<O> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        let input = self.source.stream().await;

        let normalizer = self.normalizer;
        let mut stream: EnvelopeStream<O> = Box::pin(input.then(move |item| {
            let n = normalizer.clone();
            async move {
                match item {
                    Ok(env) => n.apply(env).await,
                    Err(e) => Err(e),
                }
            }
        }));

        // Apply transforms in sequence (if any).
        for t in self.transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        self.sink.run(stream).await
    }
}
