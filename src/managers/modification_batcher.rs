//! Debounced modification batcher.
//!
//! Collects modification logs from the database and hands them downstream as
//! one ordered batch once no new modification arrived for a quiet period
//! (trailing-edge debounce). At most one timer is pending at any time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::database::BookmarksListener;
use crate::types::modification::Modification;

/// Downstream consumer of debounced batches.
pub trait BatchHandler: Send + Sync {
    fn handle_batch(&self, batch: Vec<Modification>) -> Result<(), String>;
}

impl<F> BatchHandler for F
where
    F: Fn(Vec<Modification>) -> Result<(), String> + Send + Sync,
{
    fn handle_batch(&self, batch: Vec<Modification>) -> Result<(), String> {
        self(batch)
    }
}

#[derive(Default)]
struct BatchState {
    queue: Vec<Modification>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

struct Inner {
    runtime: Handle,
    quiet_period: Duration,
    handler: Arc<dyn BatchHandler>,
    state: Mutex<BatchState>,
    // Batches reach the handler one at a time.
    handling: Mutex<()>,
}

/// Listener that coalesces bursts of modifications.
#[derive(Clone)]
pub struct BookmarksModificationBatcher {
    inner: Arc<Inner>,
}

impl BookmarksModificationBatcher {
    /// Creates a batcher whose timers run on `runtime`. The handler runs on
    /// the runtime's blocking pool.
    pub fn new(runtime: Handle, quiet_period: Duration, handler: Arc<dyn BatchHandler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                quiet_period,
                handler,
                state: Mutex::new(BatchState::default()),
                handling: Mutex::new(()),
            }),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.inner.quiet_period
    }

    /// Modifications waiting for the quiet period to elapse.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Queues `modifications` and restarts the quiet period.
    pub fn enqueue(&self, modifications: Vec<Modification>) {
        if modifications.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock();
        state.queue.extend(modifications);
        Inner::schedule(&self.inner, &mut state);
    }

    /// Cancels the pending timer and hands the queued batch to the handler on
    /// the calling thread.
    pub fn flush(&self) -> Result<(), String> {
        let batch = {
            let mut state = self.inner.state.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.generation += 1;
            std::mem::take(&mut state.queue)
        };
        if batch.is_empty() {
            return Ok(());
        }
        self.inner.run_handler(batch)
    }
}

impl Inner {
    fn schedule(inner: &Arc<Inner>, state: &mut BatchState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        let expected = state.queue.len();
        let task_inner = inner.clone();
        debug!(pending = expected, "batch timer scheduled");
        state.timer = Some(inner.runtime.spawn(async move {
            tokio::time::sleep(task_inner.quiet_period).await;
            task_inner.fire(generation, expected).await;
        }));
    }

    async fn fire(self: Arc<Self>, generation: u64, expected: usize) {
        let batch = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            if state.queue.len() != expected {
                Inner::schedule(&self, &mut state);
                return;
            }
            // Detach so a later enqueue cannot abort a batch already in flight.
            state.timer = None;
            std::mem::take(&mut state.queue)
        };
        if batch.is_empty() {
            return;
        }

        let count = batch.len();
        let inner = self.clone();
        match tokio::task::spawn_blocking(move || inner.run_handler(batch)).await {
            Ok(Ok(())) => debug!(count, "batch handled"),
            Ok(Err(e)) => warn!(count, error = %e, "batch handler failed"),
            Err(e) => warn!(count, error = %e, "batch handler panicked"),
        }
    }

    fn run_handler(&self, batch: Vec<Modification>) -> Result<(), String> {
        let _handling = self.handling.lock();
        self.handler.handle_batch(batch)
    }
}

impl BookmarksListener for BookmarksModificationBatcher {
    fn bookmarks_modified(&self, modifications: &[Modification]) {
        self.enqueue(modifications.to_vec());
    }
}
