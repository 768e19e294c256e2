//! Serialised configuration reloads.
//!
//! Reload requests arrive from SIGHUP and from `POST /-/reload`. Both go
//! through one channel to a single [`ReloadCoordinator`] task, so two
//! reloads never load and swap at the same time. The second request waits
//! in the channel until the first has finished.

use crate::config::{self, ConfigStore};
use crate::error::{LoadError, LoadStage, ReloadError};
use crate::lifecycle::triggered;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

/// A queued reload. `reply` is `None` for signal-triggered reloads.
#[derive(Debug)]
pub struct ReloadRequest {
    reply: Option<oneshot::Sender<Result<(), LoadError>>>,
}

/// The sending side, cloned into every trigger source.
#[derive(Debug, Clone)]
pub struct ReloadHandle {
    tx: mpsc::Sender<ReloadRequest>,
}

impl ReloadHandle {
    /// Requests a reload and waits for its outcome.
    pub async fn reload(&self) -> Result<(), ReloadError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(ReloadRequest { reply: Some(reply) })
            .await
            .map_err(|_| ReloadError::Unavailable)?;
        outcome
            .await
            .map_err(|_| ReloadError::Unavailable)?
            .map_err(ReloadError::from)
    }

    /// Requests a reload without waiting for it. Returns `false` if the
    /// coordinator is gone.
    pub async fn trigger(&self) -> bool {
        self.tx.send(ReloadRequest { reply: None }).await.is_ok()
    }
}

/// Owns the reload loop.
pub struct ReloadCoordinator {
    path: PathBuf,
    store: Arc<ConfigStore>,
    rx: mpsc::Receiver<ReloadRequest>,
}

impl ReloadCoordinator {
    pub fn new(path: PathBuf, store: Arc<ConfigStore>) -> (Self, ReloadHandle) {
        let (tx, rx) = mpsc::channel(8);
        (Self { path, store, rx }, ReloadHandle { tx })
    }

    /// Handles requests one at a time until shutdown or until every handle is
    /// dropped.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(path = %self.path.display(), "Reload coordinator started");
        loop {
            tokio::select! {
                biased;
                _ = triggered(&mut shutdown_rx) => {
                    info!("Reload coordinator received shutdown signal.");
                    break;
                }
                request = self.rx.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }
        info!("Reload coordinator finished.");
    }

    async fn handle(&self, request: ReloadRequest) {
        let outcome = self.reload_once().await;
        match &outcome {
            Ok(()) => info!(path = %self.path.display(), "Configuration reloaded"),
            Err(e) => error!(path = %self.path.display(), error = %e, "Configuration reload failed, keeping previous configuration"),
        }
        if let Some(reply) = request.reply {
            if reply.send(outcome).is_err() {
                warn!("Reload requester went away before the outcome was sent");
            }
        }
    }

    async fn reload_once(&self) -> Result<(), LoadError> {
        let path = self.path.clone();
        let next = tokio::task::spawn_blocking(move || config::load(&path))
            .await
            .map_err(|e| LoadError::new(LoadStage::Read, format!("load task failed: {e}")))??;
        self.store.replace(next);
        Ok(())
    }
}
