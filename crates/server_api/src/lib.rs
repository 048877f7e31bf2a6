use std::sync::Arc;

use kiln_core::{ExecutorError, ExecutorHandle};
use shared::{
    domain::{Profile, RunId, RunMode},
    error::{ApiError, ErrorCode},
    protocol::{
        Backlog, ClientCommand, ConfigSnapshot, LogEntry, RunCompleted, RunSummary, ServerEvent,
        ServerResponse, StatusSnapshot,
    },
};
use storage::{Storage, StoreError, StoredRun};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub executor: ExecutorHandle,
    pub config: ConfigSnapshot,
    mutations: Arc<Mutex<()>>,
}

impl ApiContext {
    pub fn new(storage: Storage, executor: ExecutorHandle, config: ConfigSnapshot) -> Self {
        Self {
            storage,
            executor,
            config,
            mutations: Arc::new(Mutex::new(())),
        }
    }
}

/// Events produced by one inbound command.
#[derive(Debug, Default, PartialEq)]
pub struct Dispatch {
    /// Sent only to the connection that issued the command.
    pub reply: Vec<ServerEvent>,
    /// Sent to every subscriber.
    pub broadcast: Option<ServerEvent>,
}

impl Dispatch {
    fn reply(event: ServerEvent) -> Self {
        Self {
            reply: vec![event],
            broadcast: None,
        }
    }

    fn error(error: ApiError) -> Self {
        Self::reply(ServerEvent::Error(error))
    }
}

/// Parses one inbound text frame.
///
/// The bare word `GET` is accepted as a profile list request.
pub fn decode_command(text: &str) -> Result<ClientCommand, ApiError> {
    let text = text.trim();
    if text == "GET" {
        return Ok(ClientCommand::GetProfiles);
    }
    serde_json::from_str(text).map_err(|e| {
        ApiError::new(
            ErrorCode::TransportError,
            format!("malformed command: {e}"),
        )
    })
}

pub async fn dispatch(ctx: &ApiContext, command: ClientCommand) -> Dispatch {
    debug!(?command, "dispatching command");
    match command {
        ClientCommand::Run {
            profile,
            start_at_seconds,
        } => started(start_run(ctx, profile, RunMode::Run, start_at_seconds).await),
        ClientCommand::Simulate {
            profile,
            start_at_seconds,
        } => started(start_run(ctx, profile, RunMode::Simulate, start_at_seconds).await),
        ClientCommand::Stop => match stop_run(ctx).await {
            Ok(Some(done)) => Dispatch::reply(ServerEvent::ServerResponse(ServerResponse::success(
                done.message,
            ))),
            Ok(None) => Dispatch::reply(ServerEvent::ServerResponse(ServerResponse::success(
                "No run in progress",
            ))),
            Err(error) => Dispatch::error(error),
        },
        ClientCommand::Put { profile, force } => {
            let message = format!("Profile '{}' saved", profile.name);
            profile_change(put_profile(ctx, profile, force).await, message)
        }
        ClientCommand::Delete { name } => {
            let message = format!("Profile '{name}' deleted");
            profile_change(delete_profile(ctx, &name).await, message)
        }
        ClientCommand::GetConfig => Dispatch::reply(ServerEvent::GetConfig(config(ctx))),
        ClientCommand::GetBacklog => match backlog(ctx).await {
            Ok(backlog) => Dispatch::reply(ServerEvent::BacklogData(backlog)),
            Err(error) => Dispatch::error(error),
        },
        ClientCommand::GetProfiles => match list_profiles(ctx).await {
            Ok(profiles) => Dispatch::reply(ServerEvent::ProfileList(profiles)),
            Err(error) => Dispatch::error(error),
        },
        ClientCommand::GetStatus => match status(ctx).await {
            Ok(status) => Dispatch::reply(ServerEvent::OvenUpdate(status)),
            Err(error) => Dispatch::error(error),
        },
    }
}

fn started(result: Result<RunId, ApiError>) -> Dispatch {
    match result {
        Ok(run_id) => Dispatch::reply(ServerEvent::ServerResponse(ServerResponse::success(
            format!("Run {run_id} started"),
        ))),
        Err(error) => Dispatch::error(error),
    }
}

fn profile_change(result: Result<Vec<Profile>, ApiError>, message: String) -> Dispatch {
    match result {
        Ok(profiles) => Dispatch {
            reply: vec![ServerEvent::ServerResponse(ServerResponse::success(message))],
            broadcast: Some(ServerEvent::ProfileList(profiles)),
        },
        Err(error) => Dispatch::error(error),
    }
}

/// Events a new subscriber receives before live telemetry.
pub async fn initial_events(ctx: &ApiContext) -> Result<Vec<ServerEvent>, ApiError> {
    Ok(vec![
        ServerEvent::GetConfig(config(ctx)),
        ServerEvent::ProfileList(list_profiles(ctx).await?),
        ServerEvent::BacklogData(backlog(ctx).await?),
        ServerEvent::OvenUpdate(status(ctx).await?),
    ])
}

pub fn config(ctx: &ApiContext) -> ConfigSnapshot {
    ctx.config.clone()
}

pub async fn list_profiles(ctx: &ApiContext) -> Result<Vec<Profile>, ApiError> {
    ctx.storage.list_profiles().await.map_err(store_error)
}

pub async fn put_profile(
    ctx: &ApiContext,
    profile: Profile,
    force: bool,
) -> Result<Vec<Profile>, ApiError> {
    let _guard = ctx.mutations.lock().await;
    ctx.storage
        .put_profile(&profile, force)
        .await
        .map_err(store_error)
}

pub async fn delete_profile(ctx: &ApiContext, name: &str) -> Result<Vec<Profile>, ApiError> {
    let _guard = ctx.mutations.lock().await;
    ctx.storage.delete_profile(name).await.map_err(store_error)
}

pub async fn start_run(
    ctx: &ApiContext,
    profile: Profile,
    mode: RunMode,
    start_at_seconds: Option<u64>,
) -> Result<RunId, ApiError> {
    let _guard = ctx.mutations.lock().await;
    let name = profile.name.clone();
    let run_id = ctx
        .executor
        .start(profile, mode, start_at_seconds)
        .await
        .map_err(executor_error)?;
    info!(%run_id, profile = %name, mode = mode.as_str(), "run requested");
    Ok(run_id)
}

pub async fn stop_run(ctx: &ApiContext) -> Result<Option<RunCompleted>, ApiError> {
    let _guard = ctx.mutations.lock().await;
    ctx.executor.stop().await.map_err(executor_error)
}

pub async fn status(ctx: &ApiContext) -> Result<StatusSnapshot, ApiError> {
    ctx.executor.status().await.map_err(executor_error)
}

pub async fn backlog(ctx: &ApiContext) -> Result<Backlog, ApiError> {
    ctx.executor.backlog().await.map_err(executor_error)
}

pub async fn list_runs(ctx: &ApiContext, limit: u32) -> Result<Vec<RunSummary>, ApiError> {
    let runs = ctx.storage.list_runs(limit).await.map_err(internal)?;
    Ok(runs.into_iter().map(run_summary).collect())
}

pub async fn run_log(ctx: &ApiContext, run_id: RunId) -> Result<Vec<LogEntry>, ApiError> {
    ctx.storage
        .load_run(run_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("run {run_id} not found")))?;
    ctx.storage.load_run_log(run_id).await.map_err(internal)
}

fn run_summary(run: StoredRun) -> RunSummary {
    RunSummary {
        id: run.id,
        profile: run.profile.name,
        mode: run.mode,
        started_at: run.started_at,
        finished_at: run.finished_at,
        final_state: run.final_state,
        energy_kwh: run.energy_kwh,
        cost: run.cost,
    }
}

pub fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::InvalidProfile(e) => ApiError::new(ErrorCode::InvalidProfile, e.to_string()),
        StoreError::Conflict { name } => ApiError::new(
            ErrorCode::Conflict,
            format!("profile '{name}' already exists; resend with force to overwrite"),
        ),
        StoreError::NotFound { name } => {
            ApiError::new(ErrorCode::NotFound, format!("profile '{name}' not found"))
        }
        other => {
            warn!(error = %other, "profile store failure");
            ApiError::new(ErrorCode::Internal, other.to_string())
        }
    }
}

pub fn executor_error(err: ExecutorError) -> ApiError {
    match err {
        ExecutorError::Busy => ApiError::new(ErrorCode::Busy, err.to_string()),
        ExecutorError::InvalidProfile(e) => ApiError::new(ErrorCode::InvalidProfile, e.to_string()),
        ExecutorError::Unavailable => ApiError::new(ErrorCode::Internal, err.to_string()),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
