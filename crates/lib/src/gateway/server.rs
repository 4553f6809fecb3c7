//! Gateway HTTP server: routes requests to the executor and the background supervisor
//! and serializes results as JSON.

use crate::config::{self, Config};
use crate::exec::{CommandPolicy, Executor, WorkDirs};
use crate::gateway::protocol::{
    BackgroundRequest, BackgroundResponse, ErrorResponse, ExecuteRequest, HealthResponse,
    OutputQuery, ProcessResponse,
};
use crate::supervisor::{unix_now, LookupError, ProcessId, Supervisor};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

const HEALTH_MESSAGE: &str = "command gateway is running";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub policy: Arc<CommandPolicy>,
    pub executor: Arc<Executor>,
    /// Owns the process registry; drain tasks hold their own record handles.
    pub supervisor: Arc<Supervisor>,
}

impl GatewayState {
    pub fn new(config: Config) -> Self {
        let policy = Arc::new(CommandPolicy::new());
        let executor = Executor::from_config(Arc::clone(&policy), &config.exec);
        let supervisor = Supervisor::new(
            Arc::clone(&policy),
            WorkDirs::from_config(&config.exec),
            &config.background,
        );
        Self {
            config: Arc::new(config),
            policy,
            executor: Arc::new(executor),
            supervisor: Arc::new(supervisor),
        }
    }
}

/// Routes for the gateway.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_http))
        .route("/commands/allowed", get(allowed_commands))
        .route("/execute", post(execute))
        .route("/execute/background", post(execute_background))
        .route("/background", get(list_background))
        .route(
            "/background/:pid",
            get(background_output).delete(terminate_background),
        )
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// There is no authentication: callers are trusted, so non-loopback binds only warn.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway bound to non-loopback address {} without authentication; every caller is trusted",
            bind
        );
    }
    log::info!(
        "sandbox workspace {}, command timeout {}s",
        config.exec.workspace.display(),
        config.exec.timeout_secs
    );

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let state = GatewayState::new(config);
    let supervisor = Arc::clone(&state.supervisor);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    let running = supervisor.list().await.iter().filter(|p| p.running).count();
    if running > 0 {
        log::info!("gateway stopped; {} background process(es) left running", running);
    } else {
        log::info!("gateway stopped");
    }
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(error))).into_response()
}

fn lookup_status(e: &LookupError) -> StatusCode {
    match e {
        LookupError::NotFound(_) => StatusCode::NOT_FOUND,
        LookupError::AccessDenied(_) => StatusCode::FORBIDDEN,
        LookupError::Exited(_) => StatusCode::CONFLICT,
    }
}

/// Malformed path or query parameters get the JSON error body rather than axum's plain text.
fn parse_pid(pid: Result<Path<ProcessId>, PathRejection>) -> Result<ProcessId, Response> {
    pid.map(|Path(pid)| pid)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("invalid pid: {}", e.body_text())))
}

/// GET /health returns a simple health JSON (for health checks).
async fn health_http() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: unix_now(),
        message: HEALTH_MESSAGE.to_string(),
    })
}

/// GET /commands/allowed — base command -> category name.
async fn allowed_commands(
    State(state): State<GatewayState>,
) -> Json<BTreeMap<&'static str, &'static str>> {
    Json(state.policy.allowed_commands())
}

/// POST /execute — run synchronously. Policy rejections are 200 with success=false.
async fn execute(State(state): State<GatewayState>, body: Bytes) -> Response {
    let req: ExecuteRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e)),
    };
    let Some(command) = req.command else {
        return error_response(StatusCode::BAD_REQUEST, "missing command");
    };
    let executor = Arc::clone(&state.executor);
    let working_dir = req.working_dir;
    let run = tokio::spawn(async move { executor.execute(&command, working_dir.as_deref()).await });
    match run.await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            log::error!("execute task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /execute/background — launch and return the pid without waiting.
async fn execute_background(State(state): State<GatewayState>, body: Bytes) -> Response {
    let req: BackgroundRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e)),
    };
    let Some(command) = req.command else {
        return error_response(StatusCode::BAD_REQUEST, "missing command");
    };
    let supervisor = Arc::clone(&state.supervisor);
    let launch = tokio::spawn(async move { supervisor.spawn(&command).await });
    match launch.await {
        Ok(launch) => {
            let success = launch.result.success && launch.pid.is_some();
            Json(BackgroundResponse {
                success,
                pid: launch.pid,
                result: if success { None } else { Some(launch.result) },
            })
            .into_response()
        }
        Err(e) => {
            log::error!("background launch task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /background — every tracked process, without output.
async fn list_background(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let processes = state.supervisor.list().await;
    Json(json!({ "success": true, "processes": processes }))
}

/// GET /background/:pid — buffered output so far (`?tail=N` for the last N lines).
async fn background_output(
    State(state): State<GatewayState>,
    pid: Result<Path<ProcessId>, PathRejection>,
    query: Result<Query<OutputQuery>, QueryRejection>,
) -> Response {
    let pid = match parse_pid(pid) {
        Ok(pid) => pid,
        Err(resp) => return resp,
    };
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid query: {}", e.body_text())),
    };
    match state.supervisor.query(pid, query.tail).await {
        Ok(process) => Json(ProcessResponse {
            success: true,
            process,
        })
        .into_response(),
        Err(e) => error_response(lookup_status(&e), e.to_string()),
    }
}

/// DELETE /background/:pid — kill a running background process.
async fn terminate_background(
    State(state): State<GatewayState>,
    pid: Result<Path<ProcessId>, PathRejection>,
) -> Response {
    let pid = match parse_pid(pid) {
        Ok(pid) => pid,
        Err(resp) => return resp,
    };
    match state.supervisor.terminate(pid).await {
        Ok(()) => Json(json!({ "success": true, "PID": pid })).into_response(),
        Err(e) => error_response(lookup_status(&e), e.to_string()),
    }
}
