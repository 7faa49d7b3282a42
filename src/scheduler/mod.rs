//! Priority request scheduler with a global concurrency ceiling.
//!
//! Requests wait in a queue ordered by `(priority desc, sequence asc)`.
//! A single coordinator task pops the head whenever a concurrency slot is
//! free and hands it to the [`Transport`] on its own task. The coordinator
//! is woken through one `Notify` permit, raised after every enqueue and
//! every completion; nothing else dispatches.
//!
//! Lifecycle of a request:
//!
//! ```text
//! Queued -> Dispatched -> Completed | Failed
//! Queued -> Superseded   (same id enqueued again before dispatch)
//! Queued -> Cancelled    (clear() or shutdown())
//! ```
//!
//! Every caller's [`RequestHandle`] is settled exactly once. Dispatched
//! requests are never cancelled: there is no abort channel into the
//! transport, so a transport that needs cancellation or timeouts has to
//! provide them itself.

mod handle;
mod queue;

use opentelemetry::KeyValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result, TransportError};
use crate::model::QueueStatus;
use crate::telemetry::metrics;
use crate::telemetry::request::{record_outcome, record_state_transition, start_dispatch_span};
use crate::transport::Transport;

pub use handle::RequestHandle;
use queue::{PendingQueue, QueueItem};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of requests in flight at once.
    pub concurrency_limit: usize,
    /// Pause between consecutive dispatches while more work is queued.
    pub dispatch_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            dispatch_delay: Duration::from_millis(100),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::Validation(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

type Queue<T> = PendingQueue<<T as Transport>::Descriptor, <T as Transport>::Output>;

struct Shared<T: Transport> {
    queue: Mutex<Queue<T>>,
    transport: Arc<T>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    work_ready: Notify,
    shutdown: Notify,
    running: AtomicBool,
}

/// Handle to a scheduler. Clones share the same queue and coordinator.
pub struct RequestScheduler<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for RequestScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> RequestScheduler<T> {
    /// Create a scheduler without starting its coordinator.
    ///
    /// Nothing is dispatched until [`run`](Self::run) is polled (or
    /// [`spawn`](Self::spawn) is called).
    pub fn new(transport: Arc<T>, config: SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(PendingQueue::new()),
                transport,
                config,
                clock,
                work_ready: Notify::new(),
                shutdown: Notify::new(),
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Create a scheduler on the system clock and spawn its coordinator.
    ///
    /// Must be called from within a tokio runtime. On a multi-thread
    /// runtime the coordinator may pop the first request of a burst before
    /// the rest are enqueued. To have a whole burst ordered by priority,
    /// build with [`new`](Self::new), enqueue, then [`spawn`](Self::spawn).
    pub fn start(transport: T, config: SchedulerConfig) -> Result<Self> {
        let scheduler = Self::new(Arc::new(transport), config, Arc::new(SystemClock))?;
        scheduler.spawn();
        Ok(scheduler)
    }

    /// Spawn the coordinator loop onto the current runtime.
    pub fn spawn(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.run().await {
                error!("request scheduler stopped: {e}");
            }
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.shared.transport
    }

    /// Queue a request for dispatch.
    ///
    /// If a request with the same `id` is still queued it is replaced, and
    /// its caller receives [`Error::Superseded`]. Higher `priority`
    /// dispatches first; equal priorities dispatch in enqueue order.
    ///
    /// Ordering applies to what is queued when the coordinator pops. A
    /// running coordinator with free slots can dispatch a request before a
    /// higher-priority one enqueued a moment later.
    pub fn enqueue(
        &self,
        id: impl Into<String>,
        descriptor: T::Descriptor,
        priority: i32,
    ) -> RequestHandle<T::Output> {
        let id = id.into();
        if id.is_empty() {
            return RequestHandle::failed(
                id,
                Error::Validation("request id must not be empty".to_string()),
            );
        }

        let (tx, rx) = oneshot::channel();
        let (superseded, status) = {
            let mut queue = self.lock();
            if queue.stopped {
                drop(queue);
                settle_abandoned(tx, Error::Cancelled { id: id.clone() }, "cancelled");
                return RequestHandle::new(id, rx);
            }
            let superseded = queue.push(id.clone(), descriptor, priority, tx);
            (superseded, status_of(&queue))
        };

        if let Some(old) = superseded {
            debug!(request.id = %old.id, "queued request superseded");
            settle_abandoned(old.settle, Error::Superseded { id: old.id }, "superseded");
        }

        metrics::requests_enqueued().add(1, &[]);
        debug!(
            request.id = %id,
            priority,
            queued = status.queued,
            active = status.active,
            "request enqueued"
        );

        self.shared.work_ready.notify_one();
        RequestHandle::new(id, rx)
    }

    /// Cancel every queued request; in-flight requests are unaffected.
    ///
    /// Returns how many requests were cancelled.
    pub fn clear(&self) -> usize {
        let cancelled = self.lock().drain();
        let count = cancelled.len();
        for item in cancelled {
            settle_abandoned(item.settle, Error::Cancelled { id: item.id }, "cancelled");
        }
        if count > 0 {
            info!(count, "queued requests cancelled");
        }
        count
    }

    pub fn status(&self) -> QueueStatus {
        status_of(&self.lock())
    }

    /// Stop the coordinator and cancel everything still queued.
    ///
    /// In-flight requests still settle normally. Later enqueues are
    /// cancelled immediately.
    pub fn shutdown(&self) {
        let cancelled = {
            let mut queue = self.lock();
            queue.stopped = true;
            queue.drain()
        };
        for item in cancelled {
            settle_abandoned(item.settle, Error::Cancelled { id: item.id }, "cancelled");
        }
        self.shared.shutdown.notify_one();
    }

    /// Run the coordinator loop until [`shutdown`](Self::shutdown).
    ///
    /// Only one coordinator may run per scheduler.
    pub async fn run(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Err(Error::Other(
                "request scheduler coordinator is already running".to_string(),
            ));
        }

        let limit = self.shared.config.concurrency_limit;
        let delay = self.shared.config.dispatch_delay;
        info!(
            concurrency_limit = limit,
            dispatch_delay_ms = delay.as_millis() as u64,
            "request scheduler started"
        );

        loop {
            let next = {
                let mut queue = self.lock();
                if queue.stopped {
                    break;
                }
                queue
                    .pop_ready(limit)
                    .map(|item| (item, !queue.is_empty()))
            };

            match next {
                Some((item, more_queued)) => {
                    self.dispatch(item);
                    if more_queued && !delay.is_zero() {
                        tokio::select! {
                            _ = self.shared.shutdown.notified() => break,
                            _ = self.shared.clock.sleep(delay) => {}
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = self.shared.shutdown.notified() => break,
                        _ = self.shared.work_ready.notified() => {}
                    }
                }
            }
        }

        self.shared.running.store(false, Ordering::Release);
        info!("request scheduler shutting down");
        Ok(())
    }

    /// Hand one popped item to the transport on its own task.
    ///
    /// The call runs on a nested task so a panicking transport becomes a
    /// `TransportError` and the slot is still released.
    fn dispatch(&self, item: QueueItem<T::Descriptor, T::Output>) {
        let QueueItem {
            id,
            descriptor,
            priority,
            sequence,
            settle,
        } = item;

        let span = start_dispatch_span(&id, priority);
        record_state_transition(&span, "queued", "dispatched");
        debug!(request.id = %id, priority, sequence, "dispatching request");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(
            async move {
                let started = Instant::now();
                let transport = Arc::clone(&shared.transport);
                let call = tokio::spawn(async move { transport.execute(descriptor).await });

                let outcome = match call.await {
                    Ok(result) => result.map_err(Error::from),
                    Err(join_error) => Err(Error::Transport(TransportError::Failed(format!(
                        "transport task failed: {join_error}"
                    )))),
                };
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

                let span = tracing::Span::current();
                let label = match outcome {
                    Ok(_) => "completed",
                    Err(ref e) => {
                        warn!(request.id = %id, error = %e, "request failed");
                        "failed"
                    }
                };
                record_outcome(&span, label);
                record_state_transition(&span, "dispatched", label);
                metrics::dispatch_duration_ms().record(elapsed_ms, &[]);
                metrics::requests_settled().add(1, &[KeyValue::new("outcome", label)]);

                shared
                    .queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .active -= 1;
                if settle.send(outcome).is_err() {
                    debug!(request.id = %id, "caller dropped its handle before settlement");
                }
                shared.work_ready.notify_one();
            }
            .instrument(span),
        );
    }

    fn lock(&self) -> MutexGuard<'_, Queue<T>> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn status_of<D, O>(queue: &PendingQueue<D, O>) -> QueueStatus {
    QueueStatus {
        queued: queue.len(),
        active: queue.active,
    }
}

fn settle_abandoned<O>(settle: oneshot::Sender<Result<O>>, error: Error, outcome: &'static str) {
    metrics::requests_settled().add(1, &[KeyValue::new("outcome", outcome)]);
    let _ = settle.send(Err(error));
}
