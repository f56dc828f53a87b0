//! WebSocket plumbing shared by both channels.

use crate::errors::RtmsError;

use futures_util::SinkExt;
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Time allowed for the close frame to flush before the socket is dropped.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// A connected relay socket (`ws://` or `wss://`).
pub type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial the relay.
pub async fn connect(url: &str) -> Result<RelaySocket, RtmsError> {
    let (socket, _response) = connect_async(url)
        .await
        .map_err(|e| RtmsError::Connection(format!("{url}: {e}")))?;
    Ok(socket)
}

/// Serialize `message` and write it as one text frame.
pub async fn send_json<T: Serialize>(socket: &mut RelaySocket, message: &T) -> Result<(), RtmsError> {
    let text = serde_json::to_string(message)?;
    socket.send(Message::Text(text)).await?;
    Ok(())
}

/// Send a close frame and release the socket.
///
/// Errors are ignored; the socket is dropped either way.
pub async fn close(mut socket: RelaySocket) {
    let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, socket.close(None)).await;
}
