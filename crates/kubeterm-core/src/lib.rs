//! Bridges a browser terminal, speaking JSON over a message transport, to a
//! process that wants a blocking byte stream.

pub mod bridge;
pub mod exec;
pub mod session;
pub mod transport;

pub use bridge::{BridgeConfig, BridgeState, CloseReason, TerminalBridge};
pub use exec::{ExecCommand, Launcher, PtyExecutor};
pub use session::{BridgeSession, SessionId, SessionInfo, SessionManager, SessionSummary};
pub use transport::{MemoryConnection, MemoryPeer};
