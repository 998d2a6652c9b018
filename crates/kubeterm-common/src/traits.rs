use std::sync::Arc;

use crate::error::Result;
use crate::types::{ExecTarget, ExitOutcome, StreamOptions, TerminalSize};

/// A message-framed duplex transport to the client (e.g. a WebSocket)
///
/// All methods block the calling thread; implementations must be usable from
/// several threads at once.
pub trait Connection: Send + Sync {
    /// Block until the next complete message arrives.
    ///
    /// Returns `BridgeError::TransportClosed` once the peer has gone away or
    /// `close` has been called.
    fn receive_message(&self) -> Result<Vec<u8>>;

    /// Send one outbound message
    fn send_message(&self, data: &[u8]) -> Result<()>;

    /// Close the transport, unblocking any pending `receive_message`
    fn close(&self);
}

/// The blocking byte-stream contract a remote executor consumes
pub trait TerminalStream: Send + Sync {
    /// Read up to `buf.len()` bytes of client input. `Ok(0)` is end-of-stream.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Forward process output to the client
    fn write(&self, data: &[u8]) -> Result<usize>;

    /// Block until the client requests a new terminal size. `None` is end-of-stream.
    fn next_resize(&self) -> Option<TerminalSize>;
}

/// Attaches a streaming session to a remote process
pub trait RemoteExecutor: Send + Sync {
    /// Run `target` with `stream` as its stdin/stdout/resize source.
    ///
    /// Blocks until the remote process ends or the stream reports end-of-stream.
    fn stream(
        &self,
        target: &ExecTarget,
        options: StreamOptions,
        stream: Arc<dyn TerminalStream>,
    ) -> Result<ExitOutcome>;
}
