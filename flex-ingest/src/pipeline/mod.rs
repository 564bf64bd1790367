use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{stream, Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            payload: f(self.payload),
            received_at: self.received_at,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("sink error: {0}")]
    Sink(String),
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

/// Produces envelopes lazily. An `Err` item ends the unit of work that
/// produced it; items already yielded stay valid.
#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

/// Record-level transform. One input may expand to zero or more outputs.
#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Vec<Envelope<O>>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    type Output: Send;

    async fn run<S>(&self, input: S) -> Result<Self::Output, PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, R, T, K> {
    pub source: S,
    pub transform: Arc<dyn Transform<R, T> + Send + Sync>,
    pub sink: K,
}

impl<S, R, T, K> Pipeline<S, R, T, K>
where
    R: Send + 'static,
    T: Send + 'static,
    S: Source<R> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<K::Output, PipelineError> {
        let input = self.source.stream().await;
        let transform = self.transform;

        let expanded: EnvelopeStream<T> = Box::pin(
            input
                .then(move |item| {
                    let t = transform.clone();
                    async move {
                        match item {
                            Ok(env) => t.apply(env).await,
                            Err(e) => Err(e),
                        }
                    }
                })
                .flat_map(|res| {
                    let items: Vec<Result<Envelope<T>, PipelineError>> = match res {
                        Ok(envs) => envs.into_iter().map(Ok).collect(),
                        Err(e) => vec![Err(e)],
                    };
                    stream::iter(items)
                }),
        );

        self.sink.run(expanded).await
    }
}
