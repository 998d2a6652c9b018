use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use kubeterm_common::{
    error::{BridgeError, Result},
    traits::Connection,
};
use kubeterm_protocol::Utf8Framer;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const INBOUND_CAPACITY: usize = 100;

/// A WebSocket seen through the blocking [`Connection`] contract.
///
/// Two tokio tasks own the socket halves; the bridge talks to them through
/// channels. Calls block the calling thread, so they must not be made from
/// async code.
pub struct WsConnection {
    inbound: Mutex<mpsc::Receiver<Result<Vec<u8>>>>,
    outbound: mpsc::UnboundedSender<String>,
    framer: Mutex<Utf8Framer>,
    cancel: CancellationToken,
}

/// The socket tasks behind a [`WsConnection`]
pub struct SocketTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SocketTasks {
    pub async fn join(self) {
        let _ = self.reader.await;
        let _ = self.writer.await;
    }
}

impl WsConnection {
    /// Split `socket` and start its reader and writer tasks
    pub fn spawn(socket: WebSocket) -> (Self, SocketTasks) {
        let (mut sink, mut stream) = socket.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let cancel = CancellationToken::new();

        let reader_cancel = cancel.clone();
        let reader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if !forward(&inbound_tx, &reader_cancel, Ok(text.into_bytes())).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if !forward(&inbound_tx, &reader_cancel, Ok(data)).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!("Client sent close frame: {:?}", frame);
                            break;
                        }
                        // Ping/pong are answered by axum
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket receive error: {}", e);
                            let error = BridgeError::Transport(e.to_string());
                            forward(&inbound_tx, &reader_cancel, Err(error)).await;
                            break;
                        }
                        None => break,
                    }
                }
            }
            reader_cancel.cancel();
        });

        let writer_cancel = cancel.clone();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Drain queued output before honouring a close
                    biased;
                    text = outbound_rx.recv() => match text {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                debug!("WebSocket send failed: {}", e);
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = writer_cancel.cancelled() => {
                        let frame = CloseFrame {
                            code: close_code::NORMAL,
                            reason: "".into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
            writer_cancel.cancel();
        });

        let connection = Self {
            inbound: Mutex::new(inbound_rx),
            outbound: outbound_tx,
            framer: Mutex::new(Utf8Framer::new()),
            cancel,
        };
        (connection, SocketTasks { reader, writer })
    }

    fn queue_text(&self, text: String) -> Result<()> {
        self.outbound
            .send(text)
            .map_err(|_| BridgeError::TransportClosed)
    }
}

/// Hand a client message to the bridge, giving up if the connection closes first
async fn forward(
    inbound: &mpsc::Sender<Result<Vec<u8>>>,
    cancel: &CancellationToken,
    message: Result<Vec<u8>>,
) -> bool {
    tokio::select! {
        sent = inbound.send(message) => sent.is_ok(),
        _ = cancel.cancelled() => false,
    }
}

impl Connection for WsConnection {
    fn receive_message(&self) -> Result<Vec<u8>> {
        let mut inbound = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
        inbound.blocking_recv().unwrap_or(Err(BridgeError::TransportClosed))
    }

    fn send_message(&self, data: &[u8]) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::TransportClosed);
        }
        let text = self
            .framer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame(data);
        match text {
            Some(text) => self.queue_text(text),
            None => Ok(()),
        }
    }

    fn close(&self) {
        let rest = self
            .framer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush();
        if let Some(rest) = rest {
            let _ = self.queue_text(rest);
        }
        debug!("Closing WebSocket transport");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::WebSocketUpgrade, response::Response, routing::get, Router};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    /// Serve one `/ws` route and hand each server-side connection to the test
    async fn serve() -> (String, mpsc::UnboundedReceiver<(WsConnection, SocketTasks)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/ws",
            get(move |ws: WebSocketUpgrade| {
                let tx = tx.clone();
                async move {
                    let response: Response = ws.on_upgrade(move |socket| async move {
                        let _ = tx.send(WsConnection::spawn(socket));
                    });
                    response
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("ws://{}/ws", addr), rx)
    }

    #[tokio::test]
    async fn test_client_frames_reach_receive_message() {
        let (url, mut accepted) = serve().await;
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (connection, _tasks) = accepted.recv().await.unwrap();
        let connection = Arc::new(connection);

        client
            .send(ClientMessage::Text(r#"{"type":"input","input":"ls"}"#.to_string()))
            .await
            .unwrap();

        let received = {
            let connection = Arc::clone(&connection);
            tokio::task::spawn_blocking(move || connection.receive_message())
                .await
                .unwrap()
        };
        assert_eq!(received.unwrap(), br#"{"type":"input","input":"ls"}"#.to_vec());

        client.close(None).await.unwrap();
        let after = tokio::task::spawn_blocking(move || connection.receive_message())
            .await
            .unwrap();
        assert!(matches!(after, Err(BridgeError::TransportClosed)));
    }

    #[tokio::test]
    async fn test_notice_arrives_before_close_frame() {
        let (url, mut accepted) = serve().await;
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (connection, tasks) = accepted.recv().await.unwrap();

        tokio::task::spawn_blocking(move || {
            connection.send_message(b"bye\r\n").unwrap();
            connection.close();
            assert!(matches!(
                connection.send_message(b"late"),
                Err(BridgeError::TransportClosed)
            ));
        })
        .await
        .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first, ClientMessage::Text("bye\r\n".to_string()));

        let second = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(second, ClientMessage::Close(_)));

        drop(client);
        tokio::time::timeout(Duration::from_secs(2), tasks.join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_unblocks_receive_message() {
        let (url, mut accepted) = serve().await;
        let (_client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (connection, _tasks) = accepted.recv().await.unwrap();
        let connection = Arc::new(connection);

        let blocked = {
            let connection = Arc::clone(&connection);
            tokio::task::spawn_blocking(move || connection.receive_message())
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        connection.close();

        let result = tokio::time::timeout(Duration::from_secs(2), blocked)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(BridgeError::TransportClosed)));
    }
}
