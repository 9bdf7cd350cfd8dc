use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use outpost_core::OutpostError;
use outpost_platform::EventContext;

/// Work executed on a user's worker. Receives the event's correlation
/// context; anything else is captured by the closure.
pub type EventHandler = Box<dyn FnOnce(EventContext) -> BoxFuture<'static, ()> + Send>;

struct PoolEvent {
    ctx: EventContext,
    handler: EventHandler,
}

struct PoolState {
    channels: HashMap<String, mpsc::Sender<PoolEvent>>,
    workers: Vec<JoinHandle<()>>,
    shutting_down: bool,
}

/// Fan-in of inbound events to per-user ordered queues.
///
/// Events for one user run strictly in submission order on a single worker;
/// different users run in parallel, one worker each. Workers are ephemeral:
/// a worker whose queue stays empty for the idle timeout removes itself.
pub struct EventPool {
    bot_user_id: String,
    capacity: usize,
    idle_timeout: Duration,
    state: Arc<Mutex<PoolState>>,
}

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

impl EventPool {
    pub fn new(bot_user_id: impl Into<String>) -> Arc<Self> {
        Self::with_tuning(bot_user_id, DEFAULT_CAPACITY, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_tuning(
        bot_user_id: impl Into<String>,
        capacity: usize,
        idle_timeout: Duration,
    ) -> Arc<Self> {
        info!("event pool initialized");
        Arc::new(Self {
            bot_user_id: bot_user_id.into(),
            capacity,
            idle_timeout,
            state: Arc::new(Mutex::new(PoolState {
                channels: HashMap::new(),
                workers: Vec::new(),
                shutting_down: false,
            })),
        })
    }

    /// Queue an event on the user's worker, creating the worker if needed.
    /// Events from the bot's own identity are dropped. Returns the trace id
    /// assigned to the event.
    pub async fn submit(
        &self,
        user_id: &str,
        handler: EventHandler,
    ) -> Result<Option<String>, OutpostError> {
        if user_id == self.bot_user_id {
            debug!(user_id, "skipping event from bot");
            return Ok(None);
        }

        let ctx = EventContext::new(user_id);
        let trace_id = ctx.trace_id.clone();

        let mut state = self.state.lock().await;
        if state.shutting_down {
            return Err(OutpostError::PoolShuttingDown);
        }

        if !state.channels.contains_key(user_id) {
            let (tx, rx) = mpsc::channel(self.capacity);
            state.channels.insert(user_id.to_string(), tx);
            let worker = tokio::spawn(run_worker(
                user_id.to_string(),
                rx,
                self.idle_timeout,
                self.state.clone(),
            ));
            state.workers.push(worker);
            debug!(user_id, "started user worker");
        }

        let tx = state.channels.get(user_id).expect("entry just ensured");
        match tx.try_send(PoolEvent { ctx, handler }) {
            Ok(()) => Ok(Some(trace_id)),
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!(user_id, "event channel full, dropping event");
                Err(OutpostError::EventChannelFull(user_id.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(OutpostError::PoolShuttingDown)
            }
        }
    }

    /// Number of live per-user workers (diagnostics and tests).
    pub async fn live_workers(&self) -> usize {
        self.state.lock().await.channels.len()
    }

    /// Stop accepting submissions, close every queue, and wait for all
    /// in-flight events to finish.
    pub async fn shutdown(&self) {
        let workers = {
            let mut state = self.state.lock().await;
            state.shutting_down = true;
            state.channels.clear();
            info!(worker_count = state.workers.len(), "event pool shutting down");
            std::mem::take(&mut state.workers)
        };
        for worker in workers {
            let _ = worker.await;
        }
        info!("event pool shut down");
    }
}

async fn run_worker(
    user_id: String,
    mut rx: mpsc::Receiver<PoolEvent>,
    idle_timeout: Duration,
    state: Arc<Mutex<PoolState>>,
) {
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(event)) => safe_handle(event).await,
            Ok(None) => {
                debug!(user_id, "worker queue closed, exiting");
                return;
            }
            Err(_) => {
                // Idle: deregister under the map lock so a racing submit
                // either lands before the check or creates a fresh worker.
                let mut st = state.lock().await;
                if rx.is_empty() {
                    st.channels.remove(&user_id);
                    debug!(user_id, "worker idle, evicted");
                    return;
                }
            }
        }
    }
}

/// Run one handler, isolating panics so they cannot kill the worker.
async fn safe_handle(event: PoolEvent) {
    let PoolEvent { ctx, handler } = event;
    let trace_id = ctx.trace_id.clone();
    let user_id = ctx.user_id.clone();
    if let Err(join_err) = tokio::spawn(handler(ctx)).await {
        if join_err.is_panic() {
            error!(trace_id, user_id, "recovered from panic in handler");
        }
    }
}
