//! Concurrent fan-out of independent upstream calls.
//!
//! Each request runs with its own pooled handle and its own tracked
//! operation. One failure never affects the other slots, and results come
//! back in input order whatever order they complete in.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, StreamExt};

use crate::error::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::pool::{ClientPool, PooledClient};
use crate::upstream::ClientFactory;

/// Outcome of one item in a batch.
#[derive(Debug, Clone)]
pub enum BatchSlot<T> {
    Ok(T),
    Failed { index: usize, error: Error },
}

impl<T> BatchSlot<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, BatchSlot::Failed { .. })
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            BatchSlot::Ok(_) => None,
            BatchSlot::Failed { error, .. } => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            BatchSlot::Ok(value) => Ok(value),
            BatchSlot::Failed { error, .. } => Err(error),
        }
    }
}

impl<T: Default> BatchSlot<T> {
    /// The response, or an empty one if the call failed.
    pub fn into_response(self) -> T {
        match self {
            BatchSlot::Ok(value) => value,
            BatchSlot::Failed { .. } => T::default(),
        }
    }
}

/// Runs a batch of calls against handles from a shared [`ClientPool`].
pub struct FanOutExecutor<F: ClientFactory> {
    pool: Arc<ClientPool<F>>,
    recorder: Arc<MetricsRecorder>,
    max_concurrency: Option<usize>,
}

impl<F: ClientFactory> FanOutExecutor<F> {
    /// Unbounded executor: every call of a batch starts at once.
    pub fn new(pool: Arc<ClientPool<F>>, recorder: Arc<MetricsRecorder>) -> Self {
        FanOutExecutor {
            pool,
            recorder,
            max_concurrency: None,
        }
    }

    /// Keep at most `limit` calls of a batch in flight (minimum 1).
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// Run `call` once per request and collect one slot per request, in
    /// input order.
    ///
    /// `call` receives a handle borrowed from the pool; the handle goes back
    /// when the returned future completes or is dropped. Every item is
    /// recorded under `operation`; failed items are logged with their index.
    pub async fn execute_batch<'s, 'r, Req, Resp, Call, Fut>(
        &'s self,
        operation: &str,
        requests: &'r [Req],
        call: Call,
    ) -> Vec<BatchSlot<Resp>>
    where
        Call: Fn(PooledClient<'s, F>, &'r Req) -> Fut,
        Fut: Future<Output = Result<Resp>>,
    {
        if requests.is_empty() {
            return Vec::new();
        }

        debug!(
            "Fan-out {}: {} requests (limit {:?})",
            operation,
            requests.len(),
            self.max_concurrency
        );

        let call = &call;
        let run_one = |index: usize, request: &'r Req| async move {
            let guard = self.recorder.track(operation);
            let result = match self.pool.acquire() {
                Ok(client) => call(client, request).await,
                Err(e) => Err(e),
            };
            guard.finish(&result);

            match result {
                Ok(response) => BatchSlot::Ok(response),
                Err(error) => {
                    error!("{} request {} failed: {}", operation, index, error);
                    BatchSlot::Failed { index, error }
                }
            }
        };

        let slots: Vec<BatchSlot<Resp>> = match self.max_concurrency {
            None => {
                join_all(
                    requests
                        .iter()
                        .enumerate()
                        .map(|(index, request)| run_one(index, request)),
                )
                .await
            }
            Some(limit) => {
                stream::iter(requests.iter().enumerate())
                    .map(|(index, request)| run_one(index, request))
                    .buffered(limit)
                    .collect()
                    .await
            }
        };

        let failed = slots.iter().filter(|slot| slot.is_failed()).count();
        if failed > 0 {
            warn!(
                "Fan-out {}: {}/{} requests failed",
                operation,
                failed,
                slots.len()
            );
        }

        slots
    }

    /// [`execute_batch`](Self::execute_batch) with failed slots replaced by
    /// empty responses.
    pub async fn execute_batch_or_empty<'s, 'r, Req, Resp, Call, Fut>(
        &'s self,
        operation: &str,
        requests: &'r [Req],
        call: Call,
    ) -> Vec<Resp>
    where
        Resp: Default,
        Call: Fn(PooledClient<'s, F>, &'r Req) -> Fut,
        Fut: Future<Output = Result<Resp>>,
    {
        self.execute_batch(operation, requests, call)
            .await
            .into_iter()
            .map(BatchSlot::into_response)
            .collect()
    }

    pub fn pool(&self) -> &Arc<ClientPool<F>> {
        &self.pool
    }
}
