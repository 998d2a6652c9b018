use axum::{
    extract::{ws::WebSocket, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use kubeterm_common::{traits::RemoteExecutor, types::ExecTarget};
use kubeterm_core::{BridgeConfig, BridgeSession, SessionInfo, SessionManager};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::ws::WsConnection;

/// Shared by every request
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub executor: Arc<dyn RemoteExecutor>,
    pub bridge_config: BridgeConfig,
    pub command: Vec<String>,
}

/// Query string of `GET /terminal`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalQuery {
    pub pod_ns: Option<String>,
    pub pod_name: Option<String>,
    pub container_name: Option<String>,
}

impl TerminalQuery {
    pub fn into_target(self, command: &[String]) -> Result<ExecTarget, AppError> {
        let pod = non_empty(self.pod_name)
            .ok_or_else(|| AppError::BadRequest("missing podName".to_string()))?;
        let namespace = non_empty(self.pod_ns).unwrap_or_else(|| "default".to_string());

        let mut target = ExecTarget::new(namespace, pod).with_command(command.to_vec());
        if let Some(container) = non_empty(self.container_name) {
            target = target.with_container(container);
        }
        Ok(target)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Create router with all routes
pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    if !static_dir.exists() {
        warn!("Static directory {} does not exist", static_dir.display());
    }

    Router::new()
        .route("/terminal", get(terminal_handler))
        .route("/api/sessions", get(list_sessions))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/sessions - List active terminal sessions
async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.sessions.list_sessions().await)
}

/// GET /terminal - Upgrade to a WebSocket attached to a pod
async fn terminal_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<TerminalQuery>,
) -> Result<Response, AppError> {
    let target = query.into_target(&state.command)?;
    info!("Terminal requested for {}", target);
    Ok(ws.on_upgrade(move |socket| run_terminal(socket, state, target)))
}

async fn run_terminal(socket: WebSocket, state: AppState, target: ExecTarget) {
    let (connection, tasks) = WsConnection::spawn(socket);
    let session = BridgeSession::new(
        target,
        Arc::new(connection),
        Arc::clone(&state.executor),
        state.bridge_config.clone(),
    );
    let info = session.info().clone();
    state.sessions.register(info.clone()).await;

    match tokio::task::spawn_blocking(move || session.run()).await {
        Ok(Ok(summary)) => info!(
            "{} ended ({:?}), {} bytes in, {} bytes out",
            summary.id,
            summary.close_reason,
            summary.stats.bytes_in,
            summary.stats.bytes_out
        ),
        Ok(Err(e)) => error!("{} failed: {}", info.id, e),
        Err(e) => error!("{} task panicked: {}", info.id, e),
    }

    state.sessions.remove_session(info.id).await;
    tasks.join().await;
}
