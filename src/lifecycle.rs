//! Process lifecycle: phases, the shutdown switch and OS signals.
//!
//! ```text
//! Starting ──► Serving ──► Draining ──► Stopped   (shutdown requested)
//!                 │
//!                 └──────► Draining ──► Failed    (critical task fault)
//! ```

use crate::reload::ReloadHandle;
use std::fmt;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Where the process is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Serving,
    Draining,
    Stopped,
    Failed,
}

impl Phase {
    /// Exit code for a terminal phase.
    pub fn exit_code(self) -> ExitCode {
        match self {
            Phase::Stopped => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Stopped | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Starting => "starting",
            Phase::Serving => "serving",
            Phase::Draining => "draining",
            Phase::Stopped => "stopped",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The shared shutdown switch. Once triggered it stays triggered.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once shutdown has been triggered, including before the call.
pub async fn triggered(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|triggered| *triggered).await;
}

/// Translates OS signals into reloads and shutdown until shutdown is
/// triggered.
///
/// SIGHUP queues a reload with no reply. SIGTERM and SIGINT trigger shutdown.
#[cfg(unix)]
pub async fn watch_signals(reload: ReloadHandle, shutdown: Shutdown) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = triggered(&mut shutdown_rx) => break,
            _ = hangup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                if !reload.trigger().await {
                    warn!("Reload coordinator is not running, ignoring SIGHUP");
                }
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down");
                shutdown.trigger();
                break;
            }
            _ = interrupt.recv() => {
                info!("Received SIGINT, shutting down");
                shutdown.trigger();
                break;
            }
        }
    }
    Ok(())
}

/// Translates Ctrl-C into shutdown. Reloads go through `POST /-/reload`.
#[cfg(not(unix))]
pub async fn watch_signals(_reload: ReloadHandle, shutdown: Shutdown) -> anyhow::Result<()> {
    let mut shutdown_rx = shutdown.subscribe();
    tokio::select! {
        _ = triggered(&mut shutdown_rx) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Unable to listen for Ctrl-C");
                return Err(e.into());
            }
            info!("Received Ctrl-C, shutting down");
            shutdown.trigger();
        }
    }
    Ok(())
}

/// Publishes phase transitions.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    tx: Arc<watch::Sender<Phase>>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Phase::Starting);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Phase {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }

    /// Moves to `next`. Terminal phases are final.
    pub fn set(&self, next: Phase) {
        self.tx.send_if_modified(|phase| {
            if phase.is_terminal() || *phase == next {
                return false;
            }
            if next == Phase::Failed {
                error!(from = %phase, "Entering failed phase");
            } else {
                info!(from = %phase, to = %next, "Phase change");
            }
            *phase = next;
            true
        });
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
