use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::EventContext;

/// Deferred platform mutation, executed by the single consumer.
pub type ApiThunk = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct ApiRequest {
    ctx: EventContext,
    execute: ApiThunk,
}

/// Single consumer of all outbound platform mutations.
///
/// Requests run strictly in submission order on one task; after every thunk
/// the consumer sleeps for the configured spacing, which is the global
/// outbound rate cap. Thunk errors are logged with the request trace id and
/// never stop the loop.
pub struct ApiExecutor {
    tx: Mutex<Option<UnboundedSender<ApiRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

pub const DEFAULT_SPACING: Duration = Duration::from_millis(1000);

impl ApiExecutor {
    pub fn start(spacing: Duration) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ApiRequest>();
        let worker = tokio::spawn(async move {
            info!("api executor running");
            while let Some(request) = rx.recv().await {
                if let Err(e) = (request.execute)().await {
                    error!(
                        trace_id = %request.ctx.trace_id,
                        user_id = %request.ctx.user_id,
                        error = %e,
                        "platform call failed"
                    );
                }
                tokio::time::sleep(spacing).await;
            }
            info!("api executor drained, exiting");
        });
        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Enqueue a mutation. After shutdown the request is dropped and logged.
    pub async fn submit(&self, ctx: EventContext, execute: ApiThunk) {
        let tx = self.tx.lock().await;
        match tx.as_ref() {
            Some(tx) => {
                debug!(trace_id = %ctx.trace_id, "api request queued");
                if tx.send(ApiRequest { ctx, execute }).is_err() {
                    warn!("api executor consumer gone, request dropped");
                }
            }
            None => {
                warn!(trace_id = %ctx.trace_id, "api executor stopped, request dropped");
            }
        }
    }

    /// Close the queue, let the consumer drain, and join it.
    pub async fn shutdown(&self) {
        self.tx.lock().await.take();
        if let Some(worker) = self.worker.lock().await.take() {
            let _ = worker.await;
        }
    }
}
