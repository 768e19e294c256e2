//! The main application logic, decoupled from the entry point.

use crate::{
    config::{self, ConfigStore},
    internal_metrics::MetricsBuilder,
    lifecycle::{self, triggered, Phase, PhaseTracker, Shutdown},
    reload::ReloadCoordinator,
    server::{self, AppState},
    settings::Settings,
    task_manager::{TaskFault, TaskManager},
};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    faults: mpsc::UnboundedReceiver<TaskFault>,
    shutdown: Shutdown,
    phases: PhaseTracker,
    local_addr: SocketAddr,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(settings: Settings) -> AppBuilder {
        AppBuilder::new(settings)
    }

    /// The address the HTTP listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that stops the application when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn phases(&self) -> PhaseTracker {
        self.phases.clone()
    }

    /// Serves until shutdown is requested or a critical task fails, then
    /// drains every task and returns the terminal phase.
    pub async fn run(mut self) -> Phase {
        self.phases.set(Phase::Serving);

        let mut shutdown_rx = self.shutdown.subscribe();
        let terminal = tokio::select! {
            _ = triggered(&mut shutdown_rx) => {
                info!("Shutdown signal received. Shutting down gracefully...");
                Phase::Stopped
            }
            fault = self.faults.recv() => {
                if let Some(fault) = fault {
                    error!(task = fault.task, reason = %fault.reason, "Critical task stopped, shutting down");
                }
                Phase::Failed
            }
        };

        self.phases.set(Phase::Draining);
        self.shutdown.trigger();
        self.task_manager.shutdown().await;
        self.phases.set(terminal);

        info!(phase = %terminal, "All tasks shut down.");
        terminal
    }
}

/// Binds the first address of `settings.bind_addresses()` that works.
async fn bind(settings: &Settings) -> std::io::Result<TcpListener> {
    let mut last_error = None;
    for address in settings.bind_addresses() {
        match TcpListener::bind(&address).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!(%address, error = %e, "Could not bind address");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "no listen address")
    }))
}

/// Builder for the main application.
///
/// Tests use it to hand in a pre-bound listener and to keep OS signal
/// handlers out of the test process.
pub struct AppBuilder {
    settings: Settings,
    listener: Option<TcpListener>,
    handle_signals: bool,
    extra_critical: Vec<(&'static str, BoxFuture<'static, Result<()>>)>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given settings.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            listener: None,
            handle_signals: true,
            extra_critical: Vec::new(),
        }
    }

    /// Serves on `listener` instead of binding `listen_address`.
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Whether SIGHUP, SIGTERM and SIGINT are handled.
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Runs `task` as an additional critical task, so tests can make the
    /// process fail on demand.
    pub fn critical_task_for_test<F>(mut self, name: &'static str, task: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.extra_critical.push((name, Box::pin(task)));
        self
    }

    /// Loads the configuration, binds the listener and starts every task.
    ///
    /// Fails if the initial configuration cannot be loaded or the listener
    /// cannot be bound; nothing is served in that case.
    #[instrument(skip_all)]
    pub async fn build(self) -> Result<App> {
        let settings = self.settings;

        // =========================================================================
        // 1. Metrics, so the first load is already recorded
        // =========================================================================
        let prometheus = MetricsBuilder::new().build();

        // =========================================================================
        // 2. Initial configuration
        // =========================================================================
        let initial = config::load(&settings.config_file).with_context(|| {
            format!("Error loading config {}", settings.config_file.display())
        })?;
        info!(path = %settings.config_file.display(), "Loaded config file");
        let store = Arc::new(ConfigStore::new(initial));

        // =========================================================================
        // 3. Shared lifecycle state
        // =========================================================================
        let shutdown = Shutdown::new();
        let phases = PhaseTracker::new();
        let (task_manager, faults) = TaskManager::new(shutdown.subscribe());

        let (coordinator, reload) = ReloadCoordinator::new(settings.config_file.clone(), store.clone());
        task_manager.spawn("ReloadCoordinator", coordinator.run(shutdown.subscribe()));

        if self.handle_signals {
            task_manager.spawn_critical(
                "SignalWatcher",
                lifecycle::watch_signals(reload.clone(), shutdown.clone()),
            );
        }

        // =========================================================================
        // 4. HTTP listener
        // =========================================================================
        let listener = match self.listener {
            Some(listener) => listener,
            None => bind(&settings)
                .await
                .with_context(|| format!("Error starting HTTP server on {}", settings.listen_address))?,
        };
        let local_addr = listener.local_addr()?;

        let router = server::router(AppState {
            store,
            reload,
            phases: phases.clone(),
            metrics: Some(prometheus),
        });
        task_manager.spawn_critical(
            "HttpServer",
            server::serve(listener, router, shutdown.subscribe()),
        );
        for (name, task) in self.extra_critical {
            task_manager.spawn_critical(name, task);
        }

        Ok(App {
            task_manager,
            faults,
            shutdown,
            phases,
            local_addr,
        })
    }
}
