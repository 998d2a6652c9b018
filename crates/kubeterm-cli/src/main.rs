use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use kubeterm_common::{error::BridgeError, traits::RemoteExecutor};
use kubeterm_core::{BridgeConfig, Launcher, PtyExecutor, SessionManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;
mod ws;

#[derive(Parser, Debug)]
#[command(author, version, about = "Browser terminal for Kubernetes pods", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Address to listen on
    #[arg(long, env = "KUBETERM_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Directory of static assets served at /
    #[arg(long, env = "KUBETERM_STATIC_DIR", default_value = "./public")]
    static_dir: PathBuf,

    /// kubectl binary used to exec into pods
    #[arg(long, env = "KUBETERM_KUBECTL", default_value = "kubectl")]
    kubectl: String,

    /// kubeconfig file passed to kubectl
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// kubeconfig context passed to kubectl
    #[arg(long)]
    context: Option<String>,

    /// Command run inside the container
    #[arg(long, default_value = "bash")]
    command: String,

    /// Spawn a local shell instead of exec-ing into a pod
    #[arg(long)]
    local: bool,

    /// Close a session after this many seconds without client input
    #[arg(long, value_name = "SECONDS")]
    idle_timeout: Option<u64>,

    /// Stop copying process output to stdout
    #[arg(long = "no-mirror-output", action = ArgAction::SetFalse)]
    mirror_output: bool,
}

impl Args {
    fn launcher(&self) -> Launcher {
        if self.local {
            Launcher::LocalShell { shell: None }
        } else {
            Launcher::Kubectl {
                binary: self.kubectl.clone(),
                kubeconfig: self.kubeconfig.clone(),
                context: self.context.clone(),
            }
        }
    }

    fn command(&self) -> kubeterm_common::error::Result<Vec<String>> {
        let command: Vec<String> = self.command.split_whitespace().map(String::from).collect();
        if command.is_empty() {
            return Err(BridgeError::Config("--command must not be empty".to_string()));
        }
        Ok(command)
    }

    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            read_idle_timeout: self
                .idle_timeout
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            mirror_output: self.mirror_output,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.debug {
        "kubeterm=debug,kubeterm_core=debug,kubeterm_protocol=debug,tower_http=debug"
    } else {
        "kubeterm=info,kubeterm_core=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting kubeterm");

    let launcher = args.launcher();
    info!("Using launcher: {:?}", launcher);
    let executor: Arc<dyn RemoteExecutor> = Arc::new(PtyExecutor::new(launcher));

    let state = server::AppState {
        sessions: Arc::new(SessionManager::new()),
        executor,
        bridge_config: args.bridge_config(),
        command: args.command()?,
    };
    let app = server::create_router(state, &args.static_dir);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!("Listening on http://{}", args.bind);
    info!("Terminal endpoint: ws://{}/terminal?podNs=..&podName=..&containerName=..", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["kubeterm"]);
        assert_eq!(args.bind, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(args.command().unwrap(), vec!["bash".to_string()]);
        assert!(args.bridge_config().read_idle_timeout.is_none());
        assert!(matches!(args.launcher(), Launcher::Kubectl { .. }));
        assert!(args.bridge_config().mirror_output);
    }

    #[test]
    fn test_mirror_can_be_disabled() {
        let args = Args::parse_from(["kubeterm", "--no-mirror-output"]);
        assert!(!args.bridge_config().mirror_output);
    }

    #[test]
    fn test_local_with_timeout() {
        let args = Args::parse_from([
            "kubeterm",
            "--local",
            "--idle-timeout",
            "300",
            "--command",
            "sh -l",
        ]);
        assert!(matches!(args.launcher(), Launcher::LocalShell { .. }));
        assert_eq!(
            args.bridge_config().read_idle_timeout,
            Some(Duration::from_secs(300))
        );
        assert_eq!(args.command().unwrap(), vec!["sh".to_string(), "-l".to_string()]);
    }

    #[test]
    fn test_blank_command_rejected() {
        let args = Args::parse_from(["kubeterm", "--command", "  "]);
        assert!(matches!(args.command(), Err(BridgeError::Config(_))));
    }
}
