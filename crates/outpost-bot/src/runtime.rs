use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use outpost_core::{BotConfig, RuntimeSettings};
use outpost_monitor::{Monitor, Rebuilder};
use outpost_pipeline::{tasks::register_task_handlers, Pipeline};
use outpost_platform::{executor::DEFAULT_SPACING, ApiExecutor, Gateway};
use outpost_store::Store;
use outpost_workers::{EventPool, TaskProcessor};

use crate::commands::AdminCommands;
use crate::dispatch::Dispatcher;

/// The assembled bot core. The platform adapter supplies the [`Gateway`] and
/// pushes inbound events through [`Runtime::dispatcher`].
pub struct Runtime {
    pub pipeline: Arc<Pipeline>,
    pub monitor: Arc<Monitor>,
    pub rebuilder: Arc<Rebuilder>,
    pub executor: Arc<ApiExecutor>,
    pub pool: Arc<EventPool>,
    dispatcher: Arc<Dispatcher>,
    commands: Arc<AdminCommands>,
    processor_stop: watch::Sender<bool>,
    processor_handle: JoinHandle<()>,
}

impl Runtime {
    /// Open the store, wire every component, reconcile durable monitoring
    /// state, and start the background loops.
    pub async fn bootstrap(config: BotConfig, gateway: Arc<dyn Gateway>) -> Result<Arc<Self>> {
        Self::bootstrap_with_spacing(config, gateway, DEFAULT_SPACING).await
    }

    /// `bootstrap` with an explicit outbound spacing (tests use a short one).
    pub async fn bootstrap_with_spacing(
        config: BotConfig,
        gateway: Arc<dyn Gateway>,
        spacing: Duration,
    ) -> Result<Arc<Self>> {
        let settings = Arc::new(RuntimeSettings::default());
        let store =
            Arc::new(Store::open(&config.store_path).context("failed to open the store")?);

        let executor = ApiExecutor::start(spacing);
        let pool = EventPool::new(gateway.bot_user_id());

        let monitor = Monitor::new(
            store.clone(),
            settings.clone(),
            config.channels.clone(),
            gateway.bot_user_id(),
        );
        monitor.reconcile().await;
        monitor.start().await;

        let rebuilder = Arc::new(Rebuilder::new(
            gateway.clone(),
            store.clone(),
            settings.clone(),
            config.channels.clone(),
        ));

        let pipeline = Arc::new(Pipeline {
            store: store.clone(),
            monitor: monitor.clone(),
            gateway,
            executor: executor.clone(),
            pool: pool.clone(),
            settings,
            channels: config.channels.clone(),
            roles: config.roles.clone(),
        });

        let mut processor = TaskProcessor::new(store);
        register_task_handlers(&mut processor, pipeline.clone());
        let (processor_stop, stop_rx) = watch::channel(false);
        let processor_handle = Arc::new(processor).start(stop_rx);

        let dispatcher = Arc::new(Dispatcher::new(pipeline.clone(), monitor.clone()));
        let commands = Arc::new(AdminCommands::new(pipeline.clone(), rebuilder.clone()));

        info!("all systems initialized");
        Ok(Arc::new(Self {
            pipeline,
            monitor,
            rebuilder,
            executor,
            pool,
            dispatcher,
            commands,
            processor_stop,
            processor_handle,
        }))
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn commands(&self) -> Arc<AdminCommands> {
        self.commands.clone()
    }

    /// Block until SIGINT/SIGTERM, then shut down in order.
    pub async fn run_until_signal(self: Arc<Self>) -> Result<()> {
        wait_for_signal().await;
        info!("shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Ordered shutdown: stop the ticker, stop the monitor, drain the
    /// per-user pool, then drain the API executor.
    pub async fn shutdown(&self) {
        let _ = self.processor_stop.send(true);
        self.monitor.stop().await;
        self.pool.shutdown().await;
        self.executor.shutdown().await;
        info!("shut down gracefully");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.processor_handle.abort();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
