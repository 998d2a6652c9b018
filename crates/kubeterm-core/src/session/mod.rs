use crate::bridge::{BridgeConfig, BridgeStats, CloseReason, TerminalBridge};
use kubeterm_common::{
    error::Result,
    traits::{Connection, RemoteExecutor, TerminalStream},
    types::{ExecTarget, StreamOptions},
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{error, info, instrument};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new unique session ID
    pub fn new() -> Self {
        Self(SESSION_COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Session metadata
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub target: ExecTarget,
    pub created_at: u64,
}

impl SessionInfo {
    pub fn new(target: ExecTarget) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            id: SessionId::new(),
            target,
            created_at,
        }
    }
}

/// What a finished session did
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub stats: BridgeStats,
    pub exit_code: Option<u32>,
    pub close_reason: Option<CloseReason>,
}

/// One client attached to one remote process
pub struct BridgeSession {
    info: SessionInfo,
    bridge: Arc<TerminalBridge>,
    executor: Arc<dyn RemoteExecutor>,
    options: StreamOptions,
}

impl BridgeSession {
    pub fn new(
        target: ExecTarget,
        connection: Arc<dyn Connection>,
        executor: Arc<dyn RemoteExecutor>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            info: SessionInfo::new(target),
            bridge: Arc::new(TerminalBridge::new(connection, config)),
            executor,
            options: StreamOptions::default(),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Run until either side ends, then tear down the other.
    ///
    /// Blocks the calling thread; the receive loop gets a thread of its own.
    #[instrument(skip(self), fields(session = %self.info.id, pod = %self.info.target))]
    pub fn run(self) -> Result<SessionSummary> {
        info!("Session starting");

        let receiver = {
            let bridge = Arc::clone(&self.bridge);
            thread::Builder::new()
                .name(format!("{}-recv", self.info.id))
                .spawn(move || bridge.receive_loop())?
        };

        let stream: Arc<dyn TerminalStream> = self.bridge.clone();
        let outcome = self.executor.stream(&self.info.target, self.options, stream);

        let exit_code = match &outcome {
            Ok(exit) => {
                self.bridge.shutdown(CloseReason::RemoteExited(exit.exit_code));
                Some(exit.exit_code)
            }
            Err(e) => {
                error!("Remote stream failed: {}", e);
                self.bridge.shutdown(CloseReason::RemoteError(e.to_string()));
                None
            }
        };

        if receiver.join().is_err() {
            error!("Receive loop panicked");
        }
        self.bridge.finish();

        let summary = SessionSummary {
            id: self.info.id,
            stats: self.bridge.stats(),
            exit_code,
            close_reason: self.bridge.close_reason(),
        };
        info!("Session finished: {:?}", summary);
        Ok(summary)
    }
}

/// Registry of the sessions currently being served
pub struct SessionManager {
    sessions: Arc<RwLock<Vec<SessionInfo>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn register(&self, info: SessionInfo) {
        self.sessions.write().await.push(info);
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.read().await.clone()
    }

    pub async fn remove_session(&self, id: SessionId) {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|s| s.id != id);
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
