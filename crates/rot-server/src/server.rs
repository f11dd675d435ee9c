//! WebSocket transport: one task per viewer, bridging frames to the hub.

use crate::hub::HubHandle;
use futures_util::{SinkExt, StreamExt};
use rot_sync::Request;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Accept viewers forever.
pub async fn serve(listener: TcpListener, hub: HubHandle) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };
        let hub = hub.clone();
        tokio::spawn(async move {
            log::info!("{peer}: connected");
            match handle_connection(stream, peer, hub).await {
                Ok(()) => log::info!("{peer}: disconnected"),
                Err(e) => log::warn!("{peer}: connection closed with error: {e}"),
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: HubHandle,
) -> Result<(), WsError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();

    let Some((initial, mut frames)) = hub.join().await else {
        log::warn!("{peer}: hub stopped, refusing viewer");
        return Ok(());
    };
    write.send(Message::text(&*initial)).await?;

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => match Request::from_json(&text) {
                    Ok(request) => {
                        log::trace!("{peer}: {}", request.event());
                        if !hub.submit(request).await {
                            break;
                        }
                    }
                    Err(e) => log::warn!("{peer}: dropping malformed frame: {e}"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            },
            outgoing = frames.recv() => match outgoing {
                Ok(frame) => write.send(Message::text(&*frame)).await?,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("{peer}: fell behind, skipped {skipped} frame(s)");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
