use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use growbox_common::{Controller, Settings, SettingsUpdate};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::hardware::{self, Hardware};
use crate::sensors::{SensorReadings, SensorSuite};
use crate::store::SettingsStore;

#[derive(Clone)]
struct AppState {
    controller: Arc<Controller>,
    sensors: Arc<dyn SensorSuite>,
    store: SettingsStore,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct SaveResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    operation: &'static str,
    control_enabled: bool,
    #[serde(flatten)]
    readings: SensorReadings,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Hardware {
        outputs,
        indicator,
        clock,
        sensors,
    } = hardware::build().context("hardware init failed")?;

    let store = SettingsStore::new();
    let settings = store.load().await.unwrap_or_else(|err| {
        warn!("failed to load settings from store: {err:#}");
        Settings::default()
    });

    let controller = Arc::new(Controller::new(outputs, indicator, clock));
    if settings.control_enabled {
        let startup = Arc::clone(&controller);
        let initial = settings.clone();
        tokio::task::spawn_blocking(move || startup.start(initial)).await?;
    }

    let state = AppState {
        controller: Arc::clone(&controller),
        sensors,
        store,
    };

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = Router::new()
        .route(
            "/api/settings",
            get(handle_get_settings).post(handle_post_settings),
        )
        .route("/api/status", get(handle_get_status))
        .fallback_service(ServeDir::new(web_root))
        .with_state(state);

    let port = std::env::var("GROWBOX_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(5000);
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Runs on every exit path; Drop on the controller backstops panics.
    tokio::task::spawn_blocking(move || controller.stop()).await?;
    served?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
    }
}

async fn handle_get_settings(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.load().await {
        Ok(settings) => Json(settings).into_response(),
        Err(err) => {
            warn!("failed to load settings: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load settings")
        }
    }
}

async fn handle_post_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> impl IntoResponse {
    let settings = match Settings::merged(update) {
        Ok(settings) => settings,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    if let Err(err) = state.store.save(&settings).await {
        warn!("failed to persist settings: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist settings",
        );
    }
    info!("settings saved: {settings:?}");

    // start()/stop() may block up to the worker join bound.
    let controller = Arc::clone(&state.controller);
    let apply = settings.clone();
    let applied = tokio::task::spawn_blocking(move || {
        if apply.control_enabled {
            controller.start(apply);
        } else {
            controller.stop();
        }
    })
    .await;

    if applied.is_err() {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to apply settings");
    }

    Json(SaveResponse { status: "success" }).into_response()
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    // Probe reads can block for a while (retries, 1-wire conversion).
    let sensors = Arc::clone(&state.sensors);
    let readings = tokio::task::spawn_blocking(move || sensors.read())
        .await
        .unwrap_or_default();

    Json(StatusBody {
        operation: state.controller.operation_state().as_str(),
        control_enabled: state.controller.control_enabled(),
        readings,
    })
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
