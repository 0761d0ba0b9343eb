//! WebSocket transport — accept loop and per-connection framing.
//!
//! Binds a TCP listener, upgrades each connection to WebSocket, and feeds
//! text frames into a [`ChannelSession`]. One tokio task per connection;
//! a stuck peer never blocks the others. When the socket closes for any
//! reason the session is torn down, which drops the channel's registry
//! binding.

use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use meshplane_core::{ChannelSink, ControlPlane, MeshError, MeshResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;

/// Outbound half of one WebSocket connection.
struct WsSink {
    writer: Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>,
}

#[async_trait]
impl ChannelSink for WsSink {
    async fn send_text(&self, frame: String) -> MeshResult<()> {
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(frame))
            .await
            .map_err(|e| MeshError::Transport(e.to_string()))
    }
}

/// Bind the listener and start serving in a spawned task.
///
/// Returns the actual bound address (useful when binding port 0) and the
/// accept-loop handle.
pub async fn start(
    config: ServerConfig,
    plane: ControlPlane,
) -> MeshResult<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(config.bind).await?;
    let local_addr = listener.local_addr()?;

    info!(%local_addr, service = %config.service_name, "meshplane: listening");

    let handle = tokio::spawn(async move {
        accept_loop(listener, plane).await;
    });

    Ok((local_addr, handle))
}

async fn accept_loop(listener: TcpListener, plane: ControlPlane) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(%addr, "Accepted connection");
                let plane = plane.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, addr, plane).await {
                        debug!(%addr, error = %e, "Connection ended");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "Accept error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Serve one connection: WebSocket handshake, then a frame loop until the
/// peer goes away. Session teardown runs on every exit path.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    plane: ControlPlane,
) -> MeshResult<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| MeshError::Transport(e.to_string()))?;
    let (writer, mut reader) = ws.split();

    let sink = Arc::new(WsSink {
        writer: Mutex::new(writer),
    });
    let session = plane.open_session(sink);
    info!(%addr, channel = %session.id(), "Channel open");

    while let Some(msg) = reader.next().await {
        match msg {
            Ok(Message::Text(text)) => session.handle_frame(&text).await,
            Ok(Message::Binary(_)) => {
                warn!(channel = %session.id(), "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => break,
            // Ping/pong frames are answered by the library.
            Ok(_) => {}
            Err(e) => {
                debug!(channel = %session.id(), error = %e, "Read error");
                break;
            }
        }
    }

    plane.close_session(&session);
    info!(%addr, channel = %session.id(), "Channel closed");
    Ok(())
}
