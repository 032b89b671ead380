//! Cursor, ready-queue and in-flight bookkeeping shared by every source.
//!
//! A [`SourceQueue`] is the single writer of its state. Fetches run as spawned
//! tasks so that a caller who stops waiting (timeout) does not cancel them; the
//! task still settles its outcome into the queue whenever it resolves.

use crate::types::{FeedItem, FeedPage};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Result of one upstream page request, as seen by the queue.
///
/// Upstream errors are folded into `Exhausted` before they get here, so a
/// failing source goes quiet without failing the feed.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(FeedPage),
    /// The upstream returned items but client-side tuning removed all of them.
    /// The cursor still advances and the source stays live while it has one.
    Filtered { cursor: Option<String> },
    Exhausted,
}

type InFlight = Shared<BoxFuture<'static, ()>>;

struct QueueState {
    cursor: Option<String>,
    queue: VecDeque<FeedItem>,
    has_more: bool,
    in_flight: Option<InFlight>,
}

#[derive(Clone)]
pub struct SourceQueue {
    label: Arc<str>,
    state: Arc<Mutex<QueueState>>,
}

impl SourceQueue {
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self {
            label: label.into(),
            state: Arc::new(Mutex::new(QueueState {
                cursor: None,
                queue: VecDeque::new(),
                has_more: true,
                in_flight: None,
            })),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        lock_state(&self.state)
    }

    pub fn num_ready(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn has_more(&self) -> bool {
        self.lock().has_more
    }

    pub fn cursor(&self) -> Option<String> {
        self.lock().cursor.clone()
    }

    pub fn is_fetching(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    pub fn take(&self, n: usize) -> Vec<FeedItem> {
        let mut state = self.lock();
        let n = n.min(state.queue.len());
        state.queue.drain(..n).collect()
    }

    /// Start (or join) a fetch of up to `n` items; the returned future
    /// resolves once it has settled.
    ///
    /// The request starts immediately, not on first poll. `request` receives
    /// the current cursor and `n` and is only invoked when a new upstream
    /// request is actually needed. Once the source is exhausted the returned
    /// future is already complete.
    pub fn fetch_with<F, Fut>(&self, n: usize, request: F) -> impl Future<Output = ()> + Send + 'static
    where
        F: FnOnce(Option<String>, usize) -> Fut + 'static,
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        let in_flight = self.start_or_join(n, request);
        async move {
            if let Some(in_flight) = in_flight {
                in_flight.await;
            }
        }
    }

    fn start_or_join<F, Fut>(&self, n: usize, request: F) -> Option<InFlight>
    where
        F: FnOnce(Option<String>, usize) -> Fut,
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        let mut state = self.lock();
        if !state.has_more {
            return None;
        }
        if let Some(in_flight) = &state.in_flight {
            debug!(source = %self.label, "Joining in-flight fetch");
            return Some(in_flight.clone());
        }

        debug!(source = %self.label, cursor = ?state.cursor, "Fetching up to {} items", n);
        let request = request(state.cursor.clone(), n);
        let shared_state = Arc::clone(&self.state);
        let label = Arc::clone(&self.label);
        let task = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(request).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(source = %label, "Fetch task panicked; treating source as exhausted");
                    FetchOutcome::Exhausted
                }
            };
            settle(&shared_state, &label, outcome);
        });

        let in_flight = async move {
            let _ = task.await;
        }
        .boxed()
        .shared();
        state.in_flight = Some(in_flight.clone());
        Some(in_flight)
    }
}

fn lock_state(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn settle(state: &Mutex<QueueState>, label: &str, outcome: FetchOutcome) {
    let mut state = lock_state(state);
    state.in_flight = None;
    match outcome {
        FetchOutcome::Fetched(page) if !page.feed.is_empty() => {
            let count = page.feed.len();
            state.queue.extend(page.feed);
            state.cursor = page.cursor;
            if state.cursor.is_none() {
                state.has_more = false;
            }
            debug!(
                source = %label,
                ready = state.queue.len(),
                has_more = state.has_more,
                "Enqueued {} items", count
            );
        }
        FetchOutcome::Fetched(_) => {
            state.has_more = false;
            debug!(source = %label, "Empty page; source exhausted");
        }
        FetchOutcome::Filtered { cursor } => {
            state.has_more = cursor.is_some();
            state.cursor = cursor;
            debug!(source = %label, has_more = state.has_more, "Whole page filtered out");
        }
        FetchOutcome::Exhausted => {
            state.has_more = false;
            debug!(source = %label, "Fetch failed; source exhausted");
        }
    }
}
