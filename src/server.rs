//! # HTTP Server
//!
//! The inbound surface of the bridge, served by `axum` on one listener:
//!
//! | Route        | Purpose                                               |
//! |--------------|-------------------------------------------------------|
//! | `POST /`     | Alertmanager webhook, `?room_id=` selects the room    |
//! | `/-/reload`  | `POST` reloads the configuration file                 |
//! | `/-/healthy` | liveness                                              |
//! | `/-/ready`   | readiness, `200` only while serving                   |
//! | `/config`    | active configuration as YAML, secrets redacted        |
//! | `/metrics`   | Prometheus exposition                                 |
//!
//! Error bodies are plain text ending in a newline.

use crate::alerts::AlertBatch;
use crate::config::ConfigStore;
use crate::error::NotifyError;
use crate::internal_metrics::{self, outcome};
use crate::lifecycle::{triggered, Phase, PhaseTracker};
use crate::matrix::{self, Delivery};
use crate::reload::ReloadHandle;
use crate::template;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Everything a handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub reload: ReloadHandle,
    pub phases: PhaseTracker,
    pub metrics: Option<PrometheusHandle>,
}

/// Builds the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Alertmanager batches have no size bound, so neither does the webhook.
        .route("/", post(webhook).layer(DefaultBodyLimit::disable()))
        .route("/-/reload", any(reload))
        .route("/-/healthy", get(healthy))
        .route("/-/ready", get(ready))
        .route("/config", get(show_config))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

/// Serves `router` on `listener` until shutdown is triggered, then lets
/// in-flight requests finish.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let address = listener.local_addr()?;
    info!(%address, "Listening on address");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { triggered(&mut shutdown_rx).await })
        .await?;
    info!("HTTP server stopped.");
    Ok(())
}

fn text_error(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, format!("{message}\n")).into_response()
}

#[instrument(skip_all, fields(room_id = tracing::field::Empty))]
async fn webhook(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    // One snapshot for the whole request, whatever reloads happen meanwhile.
    let snapshot = state.store.current();

    let Some(room_id) = first_room_id(params) else {
        internal_metrics::record_notification(outcome::BAD_REQUEST);
        return text_error(StatusCode::BAD_REQUEST, "No room_id specified");
    };
    tracing::Span::current().record("room_id", room_id.as_str());

    let batch: AlertBatch = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            internal_metrics::record_notification(outcome::BAD_REQUEST);
            return text_error(
                StatusCode::BAD_REQUEST,
                format_args!("Couldn't unmarshal JSON: {e}"),
            );
        }
    };
    debug!(alerts = batch.alerts.len(), status = %batch.status, "Received notification");

    match notify(&snapshot, &room_id, &batch).await {
        Ok(delivery) => {
            internal_metrics::record_notification(outcome::DELIVERED);
            relay(delivery)
        }
        Err(e) => {
            let label = match &e {
                NotifyError::Render(_) => outcome::RENDER_ERROR,
                NotifyError::Delivery(_) => outcome::DELIVERY_ERROR,
            };
            internal_metrics::record_notification(label);
            error!(error = %e, "Failed to forward notification");
            text_error(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// The first `room_id` in the query string, if it is not empty. Later
/// repetitions are ignored.
fn first_room_id(params: Vec<(String, String)>) -> Option<String> {
    params
        .into_iter()
        .find(|(key, _)| key == "room_id")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

async fn notify(
    snapshot: &crate::config::RenderableConfig,
    room_id: &str,
    batch: &AlertBatch,
) -> Result<Delivery, NotifyError> {
    let text = template::render(snapshot.template(), batch)?;
    let delivery = matrix::deliver(snapshot.transport(), snapshot.endpoint(), room_id, &text).await?;
    Ok(delivery)
}

/// Turns the homeserver's answer into ours, status and body unchanged.
fn relay(delivery: Delivery) -> Response {
    let mut response = (delivery.status, delivery.body).into_response();
    match delivery
        .content_type
        .as_deref()
        .map(header::HeaderValue::from_str)
    {
        Some(Ok(value)) => {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        Some(Err(e)) => warn!(error = %e, "Dropping unusable Content-Type from homeserver"),
        None => {
            response.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    response
}

async fn reload(State(state): State<AppState>, method: Method) -> Response {
    if method != Method::POST {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            "This endpoint requires a POST request.\n",
        )
            .into_response();
    }

    match state.reload.reload().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => text_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format_args!("failed to reload config: {e}"),
        ),
    }
}

async fn healthy() -> &'static str {
    "OK"
}

async fn ready(State(state): State<AppState>) -> Response {
    match state.phases.current() {
        Phase::Serving => (StatusCode::OK, "OK").into_response(),
        phase => (StatusCode::SERVICE_UNAVAILABLE, format!("{phase}\n")).into_response(),
    }
}

async fn show_config(State(state): State<AppState>) -> Response {
    match state.store.current().to_redacted_yaml() {
        Ok(yaml) => ([(header::CONTENT_TYPE, "text/plain")], yaml).into_response(),
        Err(e) => {
            warn!(error = %e, "Error marshalling configuration");
            text_error(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
