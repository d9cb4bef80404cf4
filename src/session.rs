//! One question-answer exchange over a server-push stream.
//!
//! [`StreamingSession::start`] spawns a driver task that owns the connection
//! and folds events into [`SessionState`]. The returned [`PendingQuery`]
//! settles exactly once: `Ok` on `done`, `Err` on any failure, and
//! `Err(Cancelled)` when the run is stopped or superseded by another
//! `start()`. Every run is stamped with a generation number and a driver
//! whose generation is no longer current cannot touch the state.

use crate::cache::{CacheInvalidator, NoopInvalidator};
use crate::client::{ClientConfig, EventTransport, HttpTransport};
use crate::credentials::CredentialStore;
use crate::error::StreamError;
use crate::protocol::{QueryRequest, StreamEvent, StreamParams};
use crate::state::{Phase, QueryOutcome, SessionState, Step};
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::Instrument;
use uuid::Uuid;

type Settlement = Result<QueryOutcome, StreamError>;

pub struct StreamingSession {
    transport: Arc<dyn EventTransport>,
    credentials: Arc<dyn CredentialStore>,
    invalidator: Arc<dyn CacheInvalidator>,
    state: Arc<watch::Sender<SessionState>>,
    active: Mutex<Option<ActiveRun>>,
    generations: AtomicU64,
}

struct ActiveRun {
    generation: u64,
    task: JoinHandle<()>,
}

impl StreamingSession {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            transport,
            credentials,
            invalidator: Arc::new(NoopInvalidator),
            state: Arc::new(state),
            active: Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }

    pub fn http(config: ClientConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        Self::new(Arc::new(HttpTransport::new(config)), credentials)
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    /// Begin a new query, stopping any run still in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: QueryRequest) -> PendingQuery {
        let (tx, rx) = oneshot::channel();

        let Some(token) = self.credentials.bearer_token() else {
            tracing::warn!("query stream not started: no bearer token");
            let _ = tx.send(Err(StreamError::AuthenticationRequired));
            return PendingQuery { rx };
        };
        let params = StreamParams::new(&request, token, self.credentials.user_id());

        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            tracing::debug!(generation = previous.generation, "superseding active query stream");
            previous.task.abort();
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| state.begin(generation));

        let driver = Driver {
            transport: Arc::clone(&self.transport),
            invalidator: Arc::clone(&self.invalidator),
            state: Arc::clone(&self.state),
            generation,
            params,
        };
        let span = tracing::info_span!(
            "query_stream",
            run_id = %Uuid::new_v4(),
            generation,
            space_id = request.space_id.as_deref().unwrap_or("-"),
        );
        let task = tokio::spawn(
            async move {
                let result = driver.run().await;
                let _ = tx.send(result);
            }
            .instrument(span),
        );

        *active = Some(ActiveRun { generation, task });
        PendingQuery { rx }
    }

    /// Close the active connection, if any. The pending query settles with
    /// [`StreamError::Cancelled`]; accumulated text is kept.
    pub fn stop(&self) {
        let Some(run) = self.lock_active().take() else {
            return;
        };
        run.task.abort();
        let stopped = self.state.send_if_modified(|state| {
            if state.generation() == run.generation && state.is_streaming() {
                state.phase = Phase::Idle;
                true
            } else {
                false
            }
        });
        if stopped {
            tracing::info!(generation = run.generation, "query stream stopped");
        }
    }

    pub fn reset(&self) {
        self.stop();
        self.state.send_modify(SessionState::clear);
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn updates(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.state.subscribe())
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        if let Some(run) = self.lock_active().take() {
            run.task.abort();
        }
    }
}

/// Settles once with the result of the query started alongside it.
#[must_use = "a query result is only observed by awaiting it"]
pub struct PendingQuery {
    rx: oneshot::Receiver<Settlement>,
}

impl Future for PendingQuery {
    type Output = Settlement;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the driver was aborted before settling.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(StreamError::Cancelled)))
    }
}

struct Driver {
    transport: Arc<dyn EventTransport>,
    invalidator: Arc<dyn CacheInvalidator>,
    state: Arc<watch::Sender<SessionState>>,
    generation: u64,
    params: StreamParams,
}

impl Driver {
    async fn run(&self) -> Settlement {
        let mut events = match self.transport.open(&self.params).await {
            Ok(events) => events,
            Err(err) => return Err(self.fail(err.into())),
        };
        tracing::debug!("query stream opened");

        while let Some(frame) = events.next().await {
            let event = match frame {
                Ok(data) => match StreamEvent::parse(&data) {
                    Ok(event) => event,
                    Err(err) => return Err(self.fail(StreamError::Protocol(err.to_string()))),
                },
                Err(err) => return Err(self.fail(err.into())),
            };

            match self.apply(event) {
                Step::Continue => {}
                Step::Completed(outcome) => {
                    tracing::info!(
                        chars = outcome.text.len(),
                        citations = outcome.citations.len(),
                        result_id = outcome.result_id.as_deref().unwrap_or("-"),
                        "query stream completed"
                    );
                    if self.params.persist {
                        self.invalidator
                            .invalidate_queries(self.params.space_id.as_deref());
                    }
                    return Ok(outcome);
                }
                Step::Failed(err) => {
                    tracing::warn!(error = %err, "query stream reported an error");
                    return Err(err);
                }
            }
        }

        Err(self.fail(StreamError::Transport(
            "stream closed before completion".to_string(),
        )))
    }

    fn apply(&self, event: StreamEvent) -> Step {
        let mut step = Step::Failed(StreamError::Cancelled);
        self.state.send_if_modified(|state| {
            if state.generation() != self.generation {
                return false;
            }
            step = state.apply(event);
            true
        });
        step
    }

    fn fail(&self, err: StreamError) -> StreamError {
        let mut recorded = false;
        self.state.send_if_modified(|state| {
            if state.generation() != self.generation {
                return false;
            }
            recorded = matches!(state.fail(err.clone()), Step::Failed(_));
            recorded
        });

        if recorded {
            tracing::warn!(error = %err, "query stream failed");
            err
        } else {
            StreamError::Cancelled
        }
    }
}
