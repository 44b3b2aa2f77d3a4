//! Single-worker request queue with tag deduplication.
//!
//! Every queued request runs on one worker task, strictly in submission order.
//! While a request is queued or running its tag is held in the in-flight
//! registry; a request built with `ignore_if_running` is dropped at submission
//! if its tag is already held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::FeedManager;
use crate::callback::panic_message;
use crate::request::Request;

/// Tag → number of queued or running requests carrying it.
type InFlight = Arc<Mutex<HashMap<String, usize>>>;

/// One request's claim on the in-flight registry.
///
/// Released exactly once, by whichever comes first: the job finishing (or
/// unwinding) or the caller cancelling it.
struct Slot {
    tag: String,
    registry: InFlight,
    released: AtomicBool,
    cancelled: AtomicBool,
}

impl Slot {
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut in_flight = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = in_flight.get_mut(&self.tag) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&self.tag);
            }
        }
    }
}

struct SlotGuard(Arc<Slot>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Handle to a queued request.
///
/// Dropping the handle does nothing; the request still runs.
#[derive(Clone)]
pub struct RequestHandle {
    slot: Arc<Slot>,
}

impl RequestHandle {
    pub fn tag(&self) -> &str {
        &self.slot.tag
    }

    /// Releases the tag and keeps the request from starting if it is still
    /// queued. A fetch already under way is not interrupted.
    pub fn cancel(&self) {
        self.slot.cancelled.store(true, Ordering::Release);
        self.slot.release();
        tracing::debug!(tag = %self.slot.tag, "Request cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("tag", &self.slot.tag)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct Job {
    request: Request,
    manager: FeedManager,
    guard: SlotGuard,
}

impl Job {
    async fn run(self) {
        let Job {
            request,
            manager,
            guard,
        } = self;

        if let Some(delay) = request.delay() {
            tokio::time::sleep(delay).await;
        }
        if guard.0.cancelled.load(Ordering::Acquire) {
            tracing::debug!(tag = %request.tag(), "Skipping cancelled request");
            return;
        }

        manager.run_queued(&request).await;
        drop(guard);
    }
}

pub(crate) struct Scheduler {
    sender: mpsc::UnboundedSender<Job>,
    in_flight: InFlight,
}

impl Scheduler {
    /// Starts the worker on the current runtime.
    pub(crate) fn spawn() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(receiver));
        Self {
            sender,
            in_flight: InFlight::default(),
        }
    }

    pub(crate) fn submit(&self, request: Request, manager: FeedManager) -> Option<RequestHandle> {
        let slot = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if request.ignore_if_running() && in_flight.contains_key(request.tag()) {
                tracing::debug!(
                    tag = %request.tag(),
                    url = %request.url(),
                    "Identically tagged request already running, ignoring"
                );
                return None;
            }
            *in_flight.entry(request.tag().to_string()).or_insert(0) += 1;
            Arc::new(Slot {
                tag: request.tag().to_string(),
                registry: Arc::clone(&self.in_flight),
                released: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
            })
        };

        let job = Job {
            request,
            manager,
            guard: SlotGuard(Arc::clone(&slot)),
        };
        if self.sender.send(job).is_err() {
            // The failed job is dropped here, releasing its slot
            tracing::warn!(tag = %slot.tag, "Request worker has stopped, request discarded");
            return None;
        }
        Some(RequestHandle { slot })
    }

    pub(crate) fn is_running(&self, tag: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(tag)
    }
}

async fn run_worker(mut jobs: mpsc::UnboundedReceiver<Job>) {
    tracing::debug!("Request worker started");
    while let Some(job) = jobs.recv().await {
        let tag = job.request.tag().to_string();
        // Each job runs in its own task so a panicking callback in unsafe mode
        // takes down only that request.
        if let Err(e) = tokio::spawn(job.run()).await {
            if e.is_panic() {
                let payload = e.into_panic();
                tracing::error!(
                    tag = %tag,
                    panic = %panic_message(&*payload),
                    "Queued request panicked"
                );
            } else {
                tracing::warn!(tag = %tag, "Queued request was aborted");
            }
        }
    }
    tracing::debug!("Request worker stopped");
}
