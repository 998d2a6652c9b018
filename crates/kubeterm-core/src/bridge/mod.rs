//! Adapter from a message-framed transport to a blocking terminal stream.
//!
//! A [`TerminalBridge`] owns two independent queues: the input bytes typed by
//! the client, and the resize events it sends. The receive loop fills both from
//! the transport while the remote executor drains them through the
//! [`TerminalStream`] contract on its own threads.

mod mirror;
mod queue;

use mirror::Mirror;
pub use queue::{BlockingQueue, Wait};
pub(crate) use queue::lock;

use kubeterm_common::{
    error::{BridgeError, Result},
    traits::{Connection, TerminalStream},
    types::TerminalSize,
};
use kubeterm_protocol::{closing_notice, decode, InboundEvent};
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

/// Per-session bridge settings
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// End the session if a read sees no input for this long
    pub read_idle_timeout: Option<Duration>,
    /// Copy process output to this process's stdout. On by default; the copy
    /// is dropped rather than delayed when stdout cannot keep up.
    pub mirror_output: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            read_idle_timeout: None,
            mirror_output: true,
        }
    }
}

/// Lifecycle of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Active,
    Closing,
    Closed,
}

/// Why a bridge left the `Active` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    TransportClosed,
    SendFailed(String),
    IdleTimeout,
    RemoteExited(u32),
    RemoteError(String),
}

impl CloseReason {
    /// Whether the client can still be told why the session ended
    fn notifies_client(&self) -> bool {
        matches!(self, CloseReason::RemoteExited(_) | CloseReason::RemoteError(_))
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::TransportClosed => write!(f, "client disconnected"),
            CloseReason::SendFailed(e) => write!(f, "send to client failed: {}", e),
            CloseReason::IdleTimeout => write!(f, "idle timeout"),
            CloseReason::RemoteExited(code) => write!(f, "process exited with code {}", code),
            CloseReason::RemoteError(e) => write!(f, "remote error: {}", e),
        }
    }
}

/// Traffic counters for one bridge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub resize_events: u64,
    pub ignored_messages: u64,
}

#[derive(Default)]
struct Counters {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    resize_events: AtomicU64,
    ignored_messages: AtomicU64,
}

struct Lifecycle {
    state: BridgeState,
    reason: Option<CloseReason>,
}

/// One client's terminal stream
pub struct TerminalBridge {
    connection: Arc<dyn Connection>,
    input: BlockingQueue<u8>,
    resizes: BlockingQueue<TerminalSize>,
    lifecycle: Mutex<Lifecycle>,
    mirror: Option<Mirror>,
    counters: Counters,
    config: BridgeConfig,
}

impl TerminalBridge {
    pub fn new(connection: Arc<dyn Connection>, config: BridgeConfig) -> Self {
        let mirror = if config.mirror_output {
            Mirror::spawn(Box::new(std::io::stdout()))
        } else {
            None
        };

        Self {
            connection,
            input: BlockingQueue::new(),
            resizes: BlockingQueue::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: BridgeState::Active,
                reason: None,
            }),
            mirror,
            counters: Counters::default(),
            config,
        }
    }

    /// Mirror process output to `writer` instead of stdout
    pub fn with_mirror(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.mirror = Mirror::spawn(writer);
        self
    }

    pub fn state(&self) -> BridgeState {
        lock(&self.lifecycle).state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        lock(&self.lifecycle).reason.clone()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            bytes_in: self.counters.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.counters.bytes_out.load(Ordering::Relaxed),
            resize_events: self.counters.resize_events.load(Ordering::Relaxed),
            ignored_messages: self.counters.ignored_messages.load(Ordering::Relaxed),
        }
    }

    /// Pump transport messages into the input buffer and resize queue.
    ///
    /// Returns once the transport closes or the bridge stops being active.
    #[instrument(skip(self))]
    pub fn receive_loop(&self) {
        info!("Receive loop started");
        while self.state() == BridgeState::Active {
            match self.connection.receive_message() {
                Ok(message) => self.dispatch(&message),
                Err(BridgeError::TransportClosed) => {
                    info!("Transport closed by client");
                    break;
                }
                Err(e) => {
                    warn!("Transport receive failed: {}", e);
                    break;
                }
            }
        }
        self.shutdown(CloseReason::TransportClosed);
        info!("Receive loop exited");
    }

    fn dispatch(&self, message: &[u8]) {
        match decode(message) {
            Ok(InboundEvent::Input(bytes)) => {
                trace!("Input: {:?}", String::from_utf8_lossy(&bytes));
                let len = bytes.len() as u64;
                if self.input.extend(bytes) {
                    self.counters.bytes_in.fetch_add(len, Ordering::Relaxed);
                }
            }
            Ok(InboundEvent::Resize(size)) => {
                debug!("Client resized terminal to {}", size);
                if self.resizes.push(size) {
                    self.counters.resize_events.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(InboundEvent::Unrecognized) => {
                debug!("Ignoring unrecognized client message");
                self.counters.ignored_messages.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Dropping malformed client message: {}", e);
                self.counters.ignored_messages.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Leave the `Active` state: wake blocked readers and close the transport.
    ///
    /// Only the first call has any effect.
    pub fn shutdown(&self, reason: CloseReason) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.state != BridgeState::Active {
                return;
            }
            lifecycle.state = BridgeState::Closing;
            lifecycle.reason = Some(reason.clone());
        }
        info!("Bridge closing: {}", reason);

        if reason.notifies_client() {
            let notice = closing_notice(&reason.to_string());
            if let Err(e) = self.connection.send_message(notice.as_bytes()) {
                debug!("Could not deliver closing notice: {}", e);
            }
        }

        self.input.close();
        self.resizes.close();
        self.connection.close();
    }

    /// Release everything once both sides of the session have stopped
    pub fn finish(&self) {
        if self.state() == BridgeState::Active {
            self.shutdown(CloseReason::TransportClosed);
        }
        self.input.clear();
        self.resizes.clear();
        lock(&self.lifecycle).state = BridgeState::Closed;
        debug!("Bridge closed");
    }

    fn mirror(&self, data: &[u8]) {
        if let Some(mirror) = &self.mirror {
            mirror.copy(data);
        }
    }
}

impl TerminalStream for TerminalBridge {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.input.pop_into(buf, self.config.read_idle_timeout) {
            Wait::Ready(n) => {
                debug!("Read {} bytes of client input", n);
                Ok(n)
            }
            Wait::Closed => Ok(0),
            Wait::TimedOut => {
                let timeout = self.config.read_idle_timeout.unwrap_or_default();
                warn!("No client input for {:?}, closing session", timeout);
                self.shutdown(CloseReason::IdleTimeout);
                Err(BridgeError::IdleTimeout(timeout))
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if self.state() != BridgeState::Active {
            return Err(BridgeError::TransportClosed);
        }

        self.mirror(data);

        match self.connection.send_message(data) {
            Ok(()) => {
                debug!("Forwarded {} bytes of output", data.len());
                self.counters
                    .bytes_out
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
                Ok(data.len())
            }
            Err(e) => {
                warn!("Failed to forward output: {}", e);
                self.shutdown(CloseReason::SendFailed(e.to_string()));
                Err(e)
            }
        }
    }

    fn next_resize(&self) -> Option<TerminalSize> {
        match self.resizes.pop(None) {
            Wait::Ready(size) => Some(size),
            Wait::Closed | Wait::TimedOut => None,
        }
    }
}
