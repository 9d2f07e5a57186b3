use std::net::SocketAddr;

use anyhow::{Context, Result};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use super::protocol::ServerMessage;
use super::session::{Session, SessionContext};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Accept WebSocket clients until `shutdown` fires or its sender is dropped.
/// Each client gets its own task and its own [`Session`].
pub async fn serve(
    listener: TcpListener,
    ctx: SessionContext,
    mut shutdown: async_broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, ctx).await {
                                error!("Connection {} failed: {:#}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Server is shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Run one client connection to completion.
///
/// Messages are handled strictly in arrival order; replies for one message
/// are all sent before the next message is read. Transcription replies go
/// out before translation of their finals is requested.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: SessionContext) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;
    info!("Client connected from {}", peer);

    let (mut sink, mut incoming) = ws.split();

    let mut session = match Session::open(ctx).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create recognizer for {}: {}", peer, e);
            send(&mut sink, &ServerMessage::error(&e)).await?;
            let _ = sink.close().await;
            return Ok(());
        }
    };
    send(&mut sink, &session.connected_status()).await?;

    while let Some(message) = incoming.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("Connection error from {}: {}", peer, e);
                break;
            }
        };

        let replies = match message {
            Message::Binary(data) => session.handle_binary(&data).await,
            Message::Text(text) => session.handle_text(&text).await,
            Message::Close(_) => break,
            other => {
                debug!("Ignoring frame from {}: {:?}", peer, other);
                continue;
            }
        };

        for reply in &replies {
            send(&mut sink, reply).await?;
        }
        for translation in &session.translate_pending().await {
            send(&mut sink, translation).await?;
        }

        if session.is_closed() {
            warn!("Closing connection {} after fatal error", peer);
            let _ = sink.close().await;
            break;
        }
    }

    info!("Client {} disconnected", peer);
    Ok(())
}

async fn send(sink: &mut WsSink, message: &ServerMessage) -> Result<()> {
    let payload = serde_json::to_string(message)?;
    sink.send(Message::Text(payload))
        .await
        .context("Failed to send message to client")?;
    Ok(())
}
