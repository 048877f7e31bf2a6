use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use kiln_core::{
    hardware::{build_hardware, build_kill_switch},
    spawn_executor,
};
use serde::Deserialize;
use server_api::{decode_command, dispatch, initial_events, ApiContext, Dispatch};
use shared::{
    domain::{Profile, RunId},
    error::{ApiError, ErrorCode},
    protocol::{Backlog, ConfigSnapshot, LogEntry, RunSummary, ServerEvent, StatusSnapshot},
};
use storage::Storage;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{
    errors::BroadcastStreamRecvError, BroadcastStream, UnboundedReceiverStream,
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod app_state;
mod config;
mod journal;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

const EVENT_CAPACITY: usize = 256;
const MAX_BODY_BYTES: usize = 256 * 1024;
const DEFAULT_RUN_LIMIT: u32 = 50;

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct PutProfileQuery {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct ListRunsQuery {
    limit: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = prepare_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (journal_tx, journal_rx) = mpsc::unbounded_channel();
    tokio::spawn(journal::run_journal(storage.clone(), journal_rx));

    let (sensor, heater) = build_hardware(&settings.kiln);
    let (executor, executor_task) = spawn_executor(
        &settings.kiln,
        sensor,
        heater,
        build_kill_switch(&settings.kiln),
        events.clone(),
        journal_tx,
    );
    tokio::spawn(async move {
        if let Err(error) = executor_task.await {
            error!(%error, "executor task died; runs can no longer be controlled");
        }
    });
    let api = ApiContext::new(storage, executor, settings.kiln.snapshot());

    let state = AppState {
        api: api.clone(),
        events,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "kiln server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(api))
        .await?;
    Ok(())
}

/// Waits for ctrl-c, then aborts any active run so the element is left off.
async fn shutdown_signal(api: ApiContext) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        return;
    }
    info!("shutting down");
    match server_api::stop_run(&api).await {
        Ok(Some(done)) => info!(message = %done.message, "active run aborted for shutdown"),
        Ok(None) => {}
        Err(error) => warn!(%error, "could not abort active run"),
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/config", get(http_config))
        .route("/status", get(http_status))
        .route("/backlog", get(http_backlog))
        .route("/profiles", get(http_list_profiles).put(http_put_profile))
        .route("/profiles/:name", delete(http_delete_profile))
        .route("/control", post(http_control))
        .route("/runs", get(http_list_runs))
        .route("/runs/:run_id/log", get(http_run_log))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Busy | ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::InvalidProfile | ErrorCode::TransportError => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::HazardExceeded | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn http_error(error: ApiError) -> HttpError {
    (status_for(error.code), Json(error))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_config(State(state): State<Arc<AppState>>) -> Json<ConfigSnapshot> {
    Json(server_api::config(&state.api))
}

async fn http_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusSnapshot>, HttpError> {
    let status = server_api::status(&state.api).await.map_err(http_error)?;
    Ok(Json(status))
}

async fn http_backlog(State(state): State<Arc<AppState>>) -> Result<Json<Backlog>, HttpError> {
    let backlog = server_api::backlog(&state.api).await.map_err(http_error)?;
    Ok(Json(backlog))
}

async fn http_list_profiles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Profile>>, HttpError> {
    let profiles = server_api::list_profiles(&state.api)
        .await
        .map_err(http_error)?;
    Ok(Json(profiles))
}

async fn http_put_profile(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PutProfileQuery>,
    Json(profile): Json<Profile>,
) -> Result<Json<Vec<Profile>>, HttpError> {
    let profiles = server_api::put_profile(&state.api, profile, q.force)
        .await
        .map_err(http_error)?;
    let _ = state.events.send(ServerEvent::ProfileList(profiles.clone()));
    Ok(Json(profiles))
}

async fn http_delete_profile(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Profile>>, HttpError> {
    let profiles = server_api::delete_profile(&state.api, &name)
        .await
        .map_err(http_error)?;
    let _ = state.events.send(ServerEvent::ProfileList(profiles.clone()));
    Ok(Json(profiles))
}

/// Accepts the same command frames as the socket and returns the reply events.
async fn http_control(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<Vec<ServerEvent>>, HttpError> {
    let command = decode_command(&body).map_err(http_error)?;
    let Dispatch { reply, broadcast } = dispatch(&state.api, command).await;
    if let Some(event) = broadcast {
        let _ = state.events.send(event);
    }
    if let [ServerEvent::Error(error)] = reply.as_slice() {
        return Err(http_error(error.clone()));
    }
    Ok(Json(reply))
}

async fn http_list_runs(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListRunsQuery>,
) -> Result<Json<Vec<RunSummary>>, HttpError> {
    let limit = q.limit.unwrap_or(DEFAULT_RUN_LIMIT).clamp(1, 500);
    let runs = server_api::list_runs(&state.api, limit)
        .await
        .map_err(http_error)?;
    Ok(Json(runs))
}

async fn http_run_log(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<Vec<LogEntry>>, HttpError> {
    let run_id = Uuid::parse_str(&run_id).map(RunId).map_err(|_| {
        http_error(ApiError::new(
            ErrorCode::TransportError,
            format!("'{run_id}' is not a run id"),
        ))
    })?;
    let log = server_api::run_log(&state.api, run_id)
        .await
        .map_err(http_error)?;
    Ok(Json(log))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let events_rx = state.events.subscribe();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // config, profiles, backlog and status go out before any live frame
    let initial = match initial_events(&state.api).await {
        Ok(events) => events,
        Err(error) => vec![ServerEvent::Error(error)],
    };
    for event in &initial {
        if send_event(&mut sender, event).await.is_err() {
            return;
        }
    }
    debug!("ws subscriber attached");

    let replies = UnboundedReceiverStream::new(reply_rx).map(Ok);
    let mut outgoing = futures::stream::select(replies, BroadcastStream::new(events_rx));
    let send_task = tokio::spawn(async move {
        while let Some(item) = outgoing.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "ws subscriber lagging, frames dropped");
                    continue;
                }
            };
            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Dispatch { reply, broadcast } = match decode_command(&text) {
            Ok(command) => dispatch(&state.api, command).await,
            Err(error) => {
                warn!(%error, "rejected ws frame");
                Dispatch {
                    reply: vec![ServerEvent::Error(error)],
                    broadcast: None,
                }
            }
        };
        for event in reply {
            let _ = reply_tx.send(event);
        }
        if let Some(event) = broadcast {
            let _ = state.events.send(event);
        }
    }

    debug!("ws subscriber detached");
    send_task.abort();
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(error) => {
            error!(%error, "failed to encode server event");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/ws_tests.rs"]
mod ws_tests;
