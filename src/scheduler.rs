//! Ingestion queue and flush scheduler.
//!
//! Owns the shared action queue and decides when batches get assembled and
//! handed to the dispatcher. Three triggers feed one coordinator task:
//! a periodic timer, a queue-depth signal raised by `enqueue`, and the
//! explicit [`flush`](FlushScheduler::flush) call. Every trigger competes
//! for a bounded set of worker slots with a non-blocking acquire; a trigger
//! that finds no free slot is dropped on the floor — draining then relies on
//! a later trigger. This is deliberate shed-load behavior, not a bug.

use crate::config::Config;
use crate::dispatch::BatchDispatcher;
use crate::model::{Action, Batch, MAX_ACTION_BYTES, MAX_BATCH_BYTES};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{interval_at, Instant};
use tracing::{debug, warn};

/// Capacity of the trigger signal channel. Signals beyond this are shed,
/// which is fine: one pending trigger is enough to drain the queue.
const SIGNAL_QUEUE_CAPACITY: usize = 8;

/// Internal trigger signals routed through the coordinator task.
enum FlushSignal {
    /// Queue length reached `max_queue_size`.
    QueueDepth,
    /// Scheduler is shutting down; stop the timer.
    Shutdown,
}

/// Multi-producer ingestion queue plus flush coordination.
///
/// Construct with [`new`](Self::new), then call [`start`](Self::start) from
/// within a tokio runtime to spawn the coordinator task that owns the flush
/// timer.
pub struct FlushScheduler {
    inner: Arc<SchedulerInner>,
    /// Signal receiver, consumed exactly once by coordinator startup.
    receiver: Mutex<Option<mpsc::Receiver<FlushSignal>>>,
}

struct SchedulerInner {
    api_key: String,
    flush_at: usize,
    max_queue_size: usize,
    threads: usize,
    flush_interval: Duration,
    queue: Mutex<VecDeque<Action>>,
    /// Worker slots; permits = configured concurrency.
    slots: Arc<Semaphore>,
    shutdown: AtomicBool,
    signal_tx: mpsc::Sender<FlushSignal>,
    dispatcher: Arc<dyn BatchDispatcher>,
}

impl FlushScheduler {
    /// Creates a scheduler delivering through the given dispatcher.
    pub fn new(
        api_key: impl Into<String>,
        config: &Config,
        dispatcher: Arc<dyn BatchDispatcher>,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);
        let threads = config.threads.max(1);

        Self {
            inner: Arc::new(SchedulerInner {
                api_key: api_key.into(),
                flush_at: config.flush_at,
                max_queue_size: config.max_queue_size,
                threads,
                flush_interval: config.flush_interval,
                queue: Mutex::new(VecDeque::new()),
                slots: Arc::new(Semaphore::new(threads)),
                shutdown: AtomicBool::new(false),
                signal_tx,
                dispatcher,
            }),
            receiver: Mutex::new(Some(signal_rx)),
        }
    }

    /// Spawns the coordinator task that multiplexes the flush timer and the
    /// trigger channel.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn start(&self) {
        let mut receiver = self
            .receiver
            .lock()
            .expect("lock poisoned")
            .take()
            .expect("FlushScheduler already started");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            // First tick one full interval out; the queue is empty at startup
            let mut ticker = interval_at(
                Instant::now() + inner.flush_interval,
                inner.flush_interval,
            );

            loop {
                if inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => inner.try_spawn_worker(),
                    signal = receiver.recv() => match signal {
                        Some(FlushSignal::QueueDepth) => inner.try_spawn_worker(),
                        Some(FlushSignal::Shutdown) | None => break,
                    },
                }
            }

            debug!("Flush coordinator stopped");
        });
    }

    /// Appends an action to the queue, non-blocking and infallible from the
    /// caller's perspective.
    ///
    /// Computes and stores the action's serialized size first. Actions larger
    /// than the per-action ceiling are dropped here: never queued, never
    /// dispatched, never resolved. The caller already counted them as
    /// submitted, which permanently skews submitted vs succeeded + failed
    /// for oversized events — observed upstream behavior, kept on purpose.
    pub fn enqueue(&self, mut action: Action) {
        let size = match serde_json::to_vec(&action) {
            Ok(bytes) => bytes.len(),
            Err(e) => {
                warn!(error = %e, event = %action.event(), "Dropping unserializable action");
                return;
            }
        };

        if size > MAX_ACTION_BYTES {
            debug!(
                size = size,
                event = %action.event(),
                "Dropping action over per-action size ceiling"
            );
            return;
        }
        action.set_size(size);

        let depth = {
            let mut queue = self.inner.queue.lock().expect("lock poisoned");
            queue.push_back(action);
            queue.len()
        };

        if depth >= self.inner.max_queue_size {
            // Fire-and-forget; a full channel means a flush is already pending
            if self.inner.signal_tx.try_send(FlushSignal::QueueDepth).is_err() {
                debug!("Queue-depth flush signal shed");
            }
        }
    }

    /// Drains the queue and blocks until every worker slot is free again.
    ///
    /// Runs one drain inline if a slot is free (otherwise another worker is
    /// already draining), then waits for the whole worker pool to go
    /// quiescent — not just the drain this call triggered.
    pub async fn flush(&self) {
        if let Ok(permit) = self.inner.slots.clone().try_acquire_owned() {
            self.inner.drain().await;
            drop(permit);
        }

        match self.inner.slots.acquire_many(self.inner.threads as u32).await {
            Ok(permits) => drop(permits),
            Err(_) => {} // semaphore closed; nothing left to wait for
        }
    }

    /// Signals shutdown: assembly loops stop taking new actions, the
    /// coordinator stops its timer. In-flight dispatches run to completion;
    /// whatever stays queued is lost with the process.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        let _ = self.inner.signal_tx.try_send(FlushSignal::Shutdown);
    }

    /// Current number of queued actions.
    pub fn queue_depth(&self) -> usize {
        self.inner.queue.lock().expect("lock poisoned").len()
    }
}

impl SchedulerInner {
    /// Starts a flush worker if a slot is free; otherwise drops the trigger.
    fn try_spawn_worker(self: &Arc<Self>) {
        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("No free flush worker slot, dropping trigger");
                return;
            }
        };

        let inner = self.clone();
        tokio::spawn(async move {
            inner.drain().await;
            drop(permit);
        });
    }

    /// Assembles and dispatches batches until the queue is empty or shutdown
    /// is signaled.
    async fn drain(&self) {
        loop {
            let actions = self.assemble();
            if actions.is_empty() {
                break;
            }

            let count = actions.len();
            let batch = Batch::new(self.api_key.clone(), actions);
            self.dispatcher.dispatch(batch).await;
            debug!(count = count, "Batch dispatched");

            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    /// Greedily dequeues actions into one batch.
    ///
    /// Stops at the configured action count, at the byte ceiling minus one
    /// action's worth of margin, on shutdown, or when the queue empties.
    /// A partial batch assembled when shutdown lands is still returned so the
    /// worker can dispatch it before exiting.
    fn assemble(&self) -> Vec<Action> {
        let mut queue = self.queue.lock().expect("lock poisoned");
        let mut actions = Vec::new();
        let mut bytes = 0usize;

        loop {
            if actions.len() >= self.flush_at {
                break;
            }
            if bytes >= MAX_BATCH_BYTES - MAX_ACTION_BYTES {
                break;
            }
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match queue.pop_front() {
                Some(action) => {
                    bytes += action.size();
                    actions.push(action);
                }
                None => break,
            }
        }

        actions
    }
}
