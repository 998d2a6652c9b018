//! Remote executors that host the target process in a local pseudo-terminal.

mod command;

pub use command::{ExecCommand, Launcher};

use crate::bridge::lock;
use kubeterm_common::{
    error::{BridgeError, Result},
    traits::{RemoteExecutor, TerminalStream},
    types::{ExecTarget, ExitOutcome, StreamOptions, TerminalSize},
};
use portable_pty::{native_pty_system, ChildKiller, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// How long to wait for trailing output after the child exits
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const PUMP_BUFFER_SIZE: usize = 4096;

/// Runs the launcher's command in a PTY and wires it to a [`TerminalStream`]
pub struct PtyExecutor {
    launcher: Launcher,
    initial_size: TerminalSize,
}

impl PtyExecutor {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            initial_size: TerminalSize::new(24, 80),
        }
    }
}

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl RemoteExecutor for PtyExecutor {
    #[instrument(skip_all, fields(pod = %target))]
    fn stream(
        &self,
        target: &ExecTarget,
        options: StreamOptions,
        stream: Arc<dyn TerminalStream>,
    ) -> Result<ExitOutcome> {
        let command = self.launcher.command_for(target, options);
        info!("Spawning `{}`", command);

        let pair = native_pty_system()
            .openpty(pty_size(self.initial_size))
            .map_err(|e| BridgeError::Pty(format!("Failed to open PTY: {}", e)))?;

        let mut child = pair
            .slave
            .spawn_command(command.to_builder())
            .map_err(|e| BridgeError::RemoteStream(format!("Failed to spawn `{}`: {}", command, e)))?;
        // The master only sees EOF once every slave handle is gone
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BridgeError::Pty(format!("Failed to clone reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::Pty(format!("Failed to take writer: {}", e)))?;
        let master = Arc::new(Mutex::new(pair.master));

        if options.stdin {
            spawn_input_pump(Arc::clone(&stream), writer, child.clone_killer())?;
        }
        if options.tty {
            spawn_resize_pump(Arc::clone(&stream), master)?;
        }
        let output_done = spawn_output_pump(stream, reader)?;

        let status = child.wait()?;
        info!("Process exited with code {}", status.exit_code());

        if output_done.recv_timeout(OUTPUT_DRAIN_TIMEOUT).is_err() {
            warn!("Output still open {:?} after exit", OUTPUT_DRAIN_TIMEOUT);
        }

        Ok(ExitOutcome {
            exit_code: status.exit_code(),
        })
    }
}

/// Client input → PTY. Kills the child once the client stops sending.
fn spawn_input_pump(
    stream: Arc<dyn TerminalStream>,
    mut writer: Box<dyn Write + Send>,
    mut killer: Box<dyn ChildKiller + Send + Sync>,
) -> Result<()> {
    thread::Builder::new()
        .name("pty-input".to_string())
        .spawn(move || {
            let mut buf = [0u8; PUMP_BUFFER_SIZE];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => {
                        debug!("Client input ended");
                        break;
                    }
                    Ok(n) => {
                        if let Err(e) = writer.write_all(&buf[..n]).and_then(|_| writer.flush()) {
                            warn!("PTY write error: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Client input failed: {}", e);
                        break;
                    }
                }
            }
            if let Err(e) = killer.kill() {
                debug!("Kill after input end: {}", e);
            }
        })?;
    Ok(())
}

/// Client resize events → PTY window size
fn spawn_resize_pump(
    stream: Arc<dyn TerminalStream>,
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
) -> Result<()> {
    thread::Builder::new()
        .name("pty-resize".to_string())
        .spawn(move || {
            while let Some(size) = stream.next_resize() {
                if !size.is_drawable() {
                    debug!("Skipping empty terminal size {}", size);
                    continue;
                }
                match lock(&master).resize(pty_size(size)) {
                    Ok(()) => debug!("PTY resized to {}", size),
                    Err(e) => warn!("Failed to resize PTY: {}", e),
                }
            }
            debug!("Resize stream ended");
        })?;
    Ok(())
}

/// PTY output → client. Signals on the returned channel when the PTY hits EOF.
fn spawn_output_pump(
    stream: Arc<dyn TerminalStream>,
    mut reader: Box<dyn Read + Send>,
) -> Result<mpsc::Receiver<()>> {
    let (done_tx, done_rx) = mpsc::channel();
    thread::Builder::new()
        .name("pty-output".to_string())
        .spawn(move || {
            let mut buf = [0u8; PUMP_BUFFER_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Err(e) = stream.write(&buf[..n]) {
                            error!("Dropping process output: {}", e);
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    // Linux reports EIO once the child side of the PTY is gone
                    Err(e) => {
                        debug!("PTY read ended: {}", e);
                        break;
                    }
                }
            }
            let _ = done_tx.send(());
        })?;
    Ok(done_rx)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bridge::{BridgeConfig, TerminalBridge};
    use crate::transport::MemoryConnection;

    #[test]
    fn test_output_reaches_client() {
        let (connection, peer) = MemoryConnection::pair();
        let bridge = Arc::new(TerminalBridge::new(
            Arc::new(connection),
            BridgeConfig::default(),
        ));
        let executor = PtyExecutor::new(Launcher::Fixed(
            ExecCommand::new("/bin/sh").args(["-c", "printf hello"]),
        ));

        let outcome = executor
            .stream(
                &ExecTarget::new("default", "local"),
                StreamOptions::default(),
                bridge.clone(),
            )
            .expect("stream failed");
        assert!(outcome.success());

        let output = peer.recv_until(Duration::from_secs(2), |out| {
            String::from_utf8_lossy(out).contains("hello")
        });
        assert!(String::from_utf8_lossy(&output).contains("hello"));

        bridge.finish();
    }

    #[test]
    fn test_spawn_failure_is_remote_error() {
        let (connection, _peer) = MemoryConnection::pair();
        let bridge = Arc::new(TerminalBridge::new(
            Arc::new(connection),
            BridgeConfig::default(),
        ));
        let executor = PtyExecutor::new(Launcher::Fixed(ExecCommand::new(
            "/nonexistent/kubeterm-test-binary",
        )));

        let result = executor.stream(
            &ExecTarget::new("default", "local"),
            StreamOptions::default(),
            bridge.clone(),
        );
        assert!(matches!(result, Err(BridgeError::RemoteStream(_))));
        bridge.finish();
    }
}
