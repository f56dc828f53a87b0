//! Scripted media relay.
//!
//! A WebSocket server on an ephemeral localhost port. Each accepted socket
//! becomes a [`RelayConnection`] the test drives by hand: read what the
//! client sent, push frames back, close.
//!
//! # Example
//!
//! ```rust,ignore
//! use rtms_test_utils::{fixtures, MockRelay};
//!
//! let mut relay = MockRelay::start().await?;
//! // ... point the client at relay.url() ...
//! let mut signaling = relay.accept().await;
//! let hello = signaling.recv_json().await;
//! assert_eq!(hello["msg_type"], 1);
//! signaling.send_json(&fixtures::signaling_ack(&relay.url()));
//! ```
//!
//! Dropping a `RelayConnection` does not close its socket; only
//! [`RelayConnection::close`] or the client does.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// How long helpers wait before failing the test.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Mock relay server.
pub struct MockRelay {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<RelayConnection>,
    accept_task: JoinHandle<()>,
}

impl MockRelay {
    /// Bind `127.0.0.1:0` and start accepting.
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Ok(socket) = accept_async(stream).await {
                        let _ = tx.send(RelayConnection::spawn(socket));
                    }
                });
            }
        });

        Ok(Self {
            addr,
            connections: rx,
            accept_task,
        })
    }

    /// `ws://` URL of this relay.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// URL with a path, for telling signaling and media endpoints apart in
    /// logs. The relay itself ignores the path.
    #[must_use]
    pub fn url_with_path(&self, path: &str) -> String {
        format!("ws://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    /// Next accepted connection. Panics after [`DEFAULT_WAIT`].
    pub async fn accept(&mut self) -> RelayConnection {
        tokio::time::timeout(DEFAULT_WAIT, self.connections.recv())
            .await
            .expect("no client connected to mock relay")
            .expect("mock relay accept loop stopped")
    }

    /// Assert no client connects within `within`.
    pub async fn expect_no_connection(&mut self, within: Duration) {
        let result = tokio::time::timeout(within, self.connections.recv()).await;
        assert!(result.is_err(), "unexpected connection to mock relay");
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

enum Outbound {
    Text(String),
    Close,
}

/// One client socket accepted by the relay.
pub struct RelayConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl RelayConnection {
    fn spawn(socket: WebSocketStream<TcpStream>) -> Self {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (mut sink, mut stream) = socket.split();
            let mut outbound_open = true;

            loop {
                tokio::select! {
                    command = outbound_rx.recv(), if outbound_open => match command {
                        Some(Outbound::Text(text)) => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Close) => {
                            let _ = sink.send(Message::Close(None)).await;
                        }
                        None => outbound_open = false,
                    },

                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let _ = inbound_tx.send(text);
                        }
                        Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self { inbound, outbound }
    }

    /// Next text frame from the client. Panics after [`DEFAULT_WAIT`] or if
    /// the client closed.
    pub async fn recv_text(&mut self) -> String {
        tokio::time::timeout(DEFAULT_WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client closed the connection")
    }

    /// Next text frame from the client, parsed as JSON.
    pub async fn recv_json(&mut self) -> Value {
        let text = self.recv_text().await;
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Next frame within `within`, or `None` on timeout or close.
    pub async fn try_recv_json(&mut self, within: Duration) -> Option<Value> {
        match tokio::time::timeout(within, self.inbound.recv()).await {
            Ok(Some(text)) => serde_json::from_str(&text).ok(),
            _ => None,
        }
    }

    /// Assert the client sends nothing within `within`.
    pub async fn expect_silence(&mut self, within: Duration) {
        if let Ok(Some(text)) = tokio::time::timeout(within, self.inbound.recv()).await {
            panic!("unexpected frame from client: {text}");
        }
    }

    pub fn send_json(&self, value: &Value) {
        self.send_text(&value.to_string());
    }

    /// Send raw text, e.g. malformed JSON.
    pub fn send_text(&self, text: &str) {
        let _ = self.outbound.send(Outbound::Text(text.to_string()));
    }

    /// Send a close frame.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Whether the client closed the socket within [`DEFAULT_WAIT`].
    ///
    /// Frames still queued are discarded.
    pub async fn wait_closed(&mut self) -> bool {
        tokio::time::timeout(DEFAULT_WAIT, async {
            while self.inbound.recv().await.is_some() {}
        })
        .await
        .is_ok()
    }
}

/// A `ws://` URL nothing listens on.
pub async fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ws://{addr}")
}
