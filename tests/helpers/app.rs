#![allow(dead_code)]
//! Test helpers for running the full application instance.

use alertmanager_matrix::{
    app::App,
    lifecycle::{Phase, PhaseTracker, Shutdown},
    settings::Settings,
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};

/// Represents a running instance of the application for testing purposes.
pub struct TestApp {
    pub addr: SocketAddr,
    pub config_path: PathBuf,
    pub client: reqwest::Client,
    shutdown: Shutdown,
    phases: PhaseTracker,
    app_handle: JoinHandle<Phase>,
    _dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Overwrites the configuration file. Takes effect on the next reload.
    pub fn write_config(&self, yaml: &str) {
        std::fs::write(&self.config_path, yaml).expect("write config file");
    }

    /// Posts `body` to the webhook endpoint, with `room_id` if given.
    pub async fn post_alerts(&self, room_id: Option<&str>, body: impl Into<reqwest::Body>) -> reqwest::Response {
        let mut request = self.client.post(self.url("/"));
        if let Some(room_id) = room_id {
            request = request.query(&[("room_id", room_id)]);
        }
        request
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("webhook request")
    }

    pub async fn reload(&self) -> reqwest::Response {
        self.client
            .post(self.url("/-/reload"))
            .send()
            .await
            .expect("reload request")
    }

    pub fn phase(&self) -> Phase {
        self.phases.current()
    }

    /// Waits until the application reports `Serving`.
    pub async fn wait_until_serving(&self) {
        let mut phases = self.phases.subscribe();
        timeout(
            Duration::from_secs(5),
            phases.wait_for(|phase| *phase == Phase::Serving),
        )
        .await
        .expect("app did not start serving in time")
        .expect("phase channel closed");
    }

    /// Triggers shutdown and waits for the terminal phase.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<Phase> {
        self.shutdown.trigger();
        timeout(timeout_duration, self.app_handle)
            .await
            .context("App failed to shut down within the timeout")?
            .context("App task panicked")
    }
}

/// A builder for creating `TestApp` instances.
pub struct TestAppBuilder {
    config: String,
}

impl TestAppBuilder {
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            config: config.into(),
        }
    }

    pub async fn build(self) -> Result<TestApp> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("ammatrix.yml");
        std::fs::write(&config_path, &self.config)?;

        let settings = Settings {
            config_file: config_path.clone(),
            listen_address: "127.0.0.1:0".to_string(),
            ..Default::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await?;

        let app = App::builder(settings)
            .listener(listener)
            .handle_signals(false)
            .build()
            .await?;

        let addr = app.local_addr();
        let shutdown = app.shutdown_handle();
        let phases = app.phases();
        let app_handle = tokio::spawn(app.run());

        let test_app = TestApp {
            addr,
            config_path,
            client: reqwest::Client::builder().no_proxy().build()?,
            shutdown,
            phases,
            app_handle,
            _dir: dir,
        };
        test_app.wait_until_serving().await;
        Ok(test_app)
    }
}
