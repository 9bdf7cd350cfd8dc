use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use outpost_core::{Task, TaskKind};
use outpost_store::Store;

/// Handles one kind of scheduled task. Implementations must be idempotent:
/// a task that fails stays queued and is re-fetched on the next tick until
/// it succeeds or is revoked (there is no retry bound; `retries` is stored
/// but intentionally never incremented).
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task) -> anyhow::Result<()>;
}

pub const TICK_INTERVAL: Duration = Duration::from_secs(5);
pub const FETCH_LIMIT: usize = 100;

/// Periodic dispatcher over the durable task queue.
pub struct TaskProcessor {
    store: Arc<Store>,
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    tick: Duration,
}

impl TaskProcessor {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            tick: TICK_INTERVAL,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn register(&mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Pull everything due right now and dispatch each task on its own
    /// task. A queue id whose body has gone missing is skipped.
    pub async fn tick_once(&self) {
        let now = Utc::now().timestamp();
        let due = match self.store.fetch_due(now, FETCH_LIMIT).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to fetch due tasks");
                return;
            }
        };
        for task_id in due {
            let task = match self.store.load_task(&task_id).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    debug!(task_id, "task body missing, skipping");
                    continue;
                }
                Err(e) => {
                    error!(task_id, error = %e, "failed to load task body");
                    continue;
                }
            };
            let Some(handler) = self.handlers.get(&task.function_name).cloned() else {
                error!(task_id, kind = %task.function_name, "no handler registered for task kind");
                continue;
            };
            tokio::spawn(async move {
                let task_id = task.task_id.clone();
                if let Err(e) = handler.handle(task).await {
                    // Failed tasks are deliberately left queued; the next
                    // tick re-fetches them (infinite retry until success or
                    // explicit revocation).
                    error!(task_id, error = %e, "task handler failed, task stays queued");
                }
            });
        }
    }

    /// Run the tick loop until the shutdown signal flips.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("task processor started");
            let mut ticker = tokio::time::interval(self.tick);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick_once().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("task processor stopping");
                            return;
                        }
                    }
                }
            }
        })
    }
}
