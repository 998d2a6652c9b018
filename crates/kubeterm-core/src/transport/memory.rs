use crate::bridge::{BlockingQueue, Wait};
use kubeterm_common::{
    error::{BridgeError, Result},
    traits::Connection,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

struct Shared {
    inbound: BlockingQueue<Vec<u8>>,
    outbound: BlockingQueue<Vec<u8>>,
}

/// In-process transport: the bridge side of a [`MemoryConnection::pair`]
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

/// The client side of a [`MemoryConnection::pair`]
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Arc<Shared>,
}

impl MemoryConnection {
    pub fn pair() -> (MemoryConnection, MemoryPeer) {
        let shared = Arc::new(Shared {
            inbound: BlockingQueue::new(),
            outbound: BlockingQueue::new(),
        });
        (
            MemoryConnection {
                shared: Arc::clone(&shared),
            },
            MemoryPeer { shared },
        )
    }
}

impl Connection for MemoryConnection {
    fn receive_message(&self) -> Result<Vec<u8>> {
        match self.shared.inbound.pop(None) {
            Wait::Ready(message) => Ok(message),
            Wait::Closed | Wait::TimedOut => Err(BridgeError::TransportClosed),
        }
    }

    fn send_message(&self, data: &[u8]) -> Result<()> {
        if self.shared.outbound.push(data.to_vec()) {
            Ok(())
        } else {
            Err(BridgeError::TransportClosed)
        }
    }

    fn close(&self) {
        debug!("Closing in-memory transport");
        self.shared.inbound.close();
        self.shared.outbound.close();
    }
}

impl MemoryPeer {
    /// Deliver one raw client message
    pub fn send(&self, message: &[u8]) -> bool {
        self.shared.inbound.push(message.to_vec())
    }

    /// Send an `input` control message
    pub fn send_input(&self, text: &str) -> bool {
        let message = serde_json::json!({ "type": "input", "input": text });
        self.send(message.to_string().as_bytes())
    }

    /// Send a `resize` control message
    pub fn send_resize(&self, rows: u16, cols: u16) -> bool {
        let message = serde_json::json!({ "type": "resize", "rows": rows, "cols": cols });
        self.send(message.to_string().as_bytes())
    }

    /// Wait up to `timeout` for the next outbound frame
    pub fn recv(&self, timeout: Duration) -> Option<Vec<u8>> {
        match self.shared.outbound.pop(Some(timeout)) {
            Wait::Ready(frame) => Some(frame),
            Wait::Closed | Wait::TimedOut => None,
        }
    }

    /// Collect frames until `pred` holds for the concatenated output or
    /// `timeout` passes without a new frame.
    pub fn recv_until<F>(&self, timeout: Duration, mut pred: F) -> Vec<u8>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let mut output = Vec::new();
        while !pred(&output) {
            match self.recv(timeout) {
                Some(frame) => output.extend_from_slice(&frame),
                None => break,
            }
        }
        output
    }

    /// Drop the connection from the client side
    pub fn disconnect(&self) {
        self.shared.inbound.close();
        self.shared.outbound.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inbound.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_flow_both_ways() {
        let (connection, peer) = MemoryConnection::pair();
        assert!(peer.send_resize(24, 80));
        let received = connection.receive_message().unwrap();
        assert_eq!(
            kubeterm_protocol::decode(&received).unwrap(),
            kubeterm_protocol::InboundEvent::Resize(kubeterm_common::types::TerminalSize::new(24, 80))
        );

        connection.send_message(b"prompt$ ").unwrap();
        assert_eq!(peer.recv(Duration::from_secs(1)), Some(b"prompt$ ".to_vec()));
    }

    #[test]
    fn test_close_unblocks_receiver() {
        let (connection, peer) = MemoryConnection::pair();
        let connection = Arc::new(connection);
        let waiter = {
            let connection = Arc::clone(&connection);
            std::thread::spawn(move || connection.receive_message())
        };
        std::thread::sleep(Duration::from_millis(50));
        connection.close();

        assert!(matches!(
            waiter.join().unwrap(),
            Err(BridgeError::TransportClosed)
        ));
        assert!(peer.is_closed());
        assert!(!peer.send_input("too late"));
        assert!(connection.send_message(b"x").is_err());
    }
}
