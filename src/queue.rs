//! Serialising retry queue for model calls.
//!
//! Every AI-backed generation request in the process funnels through one
//! [`GenerationQueue`]: an unbounded channel feeding a single worker task, so
//! at most one model call is in flight and later requests wait in FIFO order.
//! Each queued job runs [`run_with_retry`] with its [`RetryPolicy`].
//!
//! ```text
//! enqueue ─▶ [ job │ job │ job ] ─▶ worker ─▶ tokio::spawn(job).await
//!    ▲                                            │
//!    └──────────── oneshot result ◀───────────────┘
//! ```
//!
//! There is no cancellation and no queue-level timeout: a queued job runs to
//! completion or exhausts its retries. Timeouts come from the client.

use crate::error::AttemptError;
use crate::llm::{ChatReply, ChatRequest, ClientAccessor};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first failure; `retries + 1` attempts in total.
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(4000),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed_attempt`-th failure (1-indexed):
    /// `min(base * 2^(n-1), max)`.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `task` until it succeeds or `policy.retries + 1` attempts have failed.
///
/// The error of the last failed attempt is returned. `task` is called afresh
/// for every attempt, so it must rebuild whatever state an attempt consumes.
pub async fn run_with_retry<T, E, F, Fut>(mut task: F, policy: RetryPolicy) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failed = 0u32;
    loop {
        match task().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                failed += 1;
                if failed > policy.retries {
                    return Err(e);
                }
                let delay = policy.delay_for(failed);
                warn!(
                    "Attempt {}/{} failed: {} (retrying in {:?})",
                    failed,
                    policy.retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

type Job = BoxFuture<'static, ()>;

#[derive(Default)]
struct QueueState {
    pending: AtomicUsize,
    processing: AtomicBool,
}

/// Single-worker FIFO queue for model calls.
///
/// Cloning is cheap; clones share the same worker. The worker stops once
/// every clone has been dropped and the backlog is drained. Must be created
/// inside a Tokio runtime.
#[derive(Clone)]
pub struct GenerationQueue {
    tx: mpsc::UnboundedSender<Job>,
    accessor: ClientAccessor,
    policy: RetryPolicy,
    state: Arc<QueueState>,
}

impl GenerationQueue {
    pub fn new(accessor: ClientAccessor, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        tokio::spawn(worker(rx, Arc::clone(&state)));
        Self {
            tx,
            accessor,
            policy,
            state,
        }
    }

    /// Jobs waiting behind the running one.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Whether a job is running right now.
    pub fn is_processing(&self) -> bool {
        self.state.processing.load(Ordering::SeqCst)
    }

    pub fn default_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Queue `task` under `policy` (or the queue default).
    ///
    /// The job's position is fixed when this is called, not when the returned
    /// future is first polled. A job that panics resolves to
    /// [`AttemptError::QueueClosed`] and the worker carries on.
    pub fn enqueue<T, F, Fut>(
        &self,
        task: F,
        policy: Option<RetryPolicy>,
    ) -> impl Future<Output = Result<T, AttemptError>> + Send + 'static
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, AttemptError>> + Send + 'static,
    {
        let policy = policy.unwrap_or(self.policy);
        let (result_tx, result_rx) = oneshot::channel();

        let job: Job = Box::pin(async move {
            let result = run_with_retry(task, policy).await;
            // The caller may have stopped waiting.
            let _ = result_tx.send(result);
        });

        self.state.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
        }

        async move { result_rx.await.unwrap_or(Err(AttemptError::QueueClosed)) }
    }

    /// Queue one chat completion against whatever client the accessor returns
    /// at the time of each attempt.
    pub fn call_chat_completion(
        &self,
        request: ChatRequest,
        policy: Option<RetryPolicy>,
    ) -> impl Future<Output = Result<ChatReply, AttemptError>> + Send + 'static {
        let accessor = Arc::clone(&self.accessor);
        self.enqueue(
            move || {
                let client = accessor();
                let request = request.clone();
                async move {
                    let client = client.ok_or(AttemptError::ClientUnavailable)?;
                    client.complete(request).await
                }
            },
            policy,
        )
    }
}

async fn worker(mut rx: mpsc::UnboundedReceiver<Job>, state: Arc<QueueState>) {
    while let Some(job) = rx.recv().await {
        state.pending.fetch_sub(1, Ordering::SeqCst);
        state.processing.store(true, Ordering::SeqCst);
        if let Err(e) = tokio::spawn(job).await {
            warn!("Generation job aborted: {}", e);
        }
        state.processing.store(false, Ordering::SeqCst);
    }
    debug!("Generation queue worker stopped");
}
