// WebSocket client for the auction push channel.
//
// Keeps one connection open, forwards inbound text frames to the app as raw
// JSON, writes outbound client events, and reconnects after a fixed delay
// whenever the connection drops.

use std::fmt::Display;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::protocol::ClientEvent;

/// Channel-level events delivered to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A connection was established.
    Opened { url: String },
    /// The current connection went away; a reconnect will follow.
    Closed,
    /// A text frame from the server (raw JSON string).
    Message(String),
}

/// How a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// Connection lost; try again.
    Reconnect,
    /// The app side hung up; stop for good.
    Shutdown,
}

/// Run the channel until the app drops its side of either mpsc.
///
/// Outbound events queued while disconnected stay in `outbound` and are
/// written after the next successful connect. Connection failures are
/// retried; a malformed URL is returned as an error since no retry can fix
/// it.
pub async fn run(
    url: String,
    reconnect_delay: Duration,
    tx: mpsc::Sender<ChannelEvent>,
    mut outbound: mpsc::Receiver<ClientEvent>,
) -> anyhow::Result<()> {
    let mut pending = None;
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => {
                info!("Connected to {url}");
                if tx.send(ChannelEvent::Opened { url: url.clone() }).await.is_err() {
                    break;
                }

                let (write, read) = ws_stream.split();
                let exit = pump(read, write, &tx, &mut outbound, &mut pending).await;

                if tx.send(ChannelEvent::Closed).await.is_err() || exit == PumpExit::Shutdown {
                    break;
                }
                info!("Connection to {url} lost, reconnecting in {reconnect_delay:?}");
            }
            Err(e @ (WsError::Url(_) | WsError::HttpFormat(_))) => {
                return Err(anyhow::Error::new(e).context(format!("invalid channel url {url}")));
            }
            Err(e) => {
                warn!("Failed to connect to {url}: {e}; retrying in {reconnect_delay:?}");
            }
        }

        if tx.is_closed() {
            break;
        }
        tokio::time::sleep(reconnect_delay).await;
    }

    info!("Channel task exiting");
    Ok(())
}

/// Shuttle frames for one connection.
///
/// `pending` holds an event whose write failed on a previous connection; it
/// goes out before anything else.
///
/// Generic over the read stream and write sink so it can be driven by
/// in-memory streams in tests.
pub async fn pump<St, Si>(
    mut read: St,
    mut write: Si,
    tx: &mpsc::Sender<ChannelEvent>,
    outbound: &mut mpsc::Receiver<ClientEvent>,
    pending: &mut Option<ClientEvent>,
) -> PumpExit
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    if let Some(event) = pending.take() {
        if !send_event(&mut write, event, pending).await {
            return PumpExit::Reconnect;
        }
    }

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(ChannelEvent::Message(text.to_string())).await.is_err() {
                            return PumpExit::Shutdown;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!("Failed to answer ping: {e}");
                            return PumpExit::Reconnect;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Server sent close frame");
                        return PumpExit::Reconnect;
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong and raw frames carry nothing for us.
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {e}");
                        return PumpExit::Reconnect;
                    }
                    None => return PumpExit::Reconnect,
                }
            }

            event = outbound.recv() => {
                let Some(event) = event else {
                    let _ = write.send(Message::Close(None)).await;
                    return PumpExit::Shutdown;
                };
                if !send_event(&mut write, event, pending).await {
                    return PumpExit::Reconnect;
                }
            }
        }
    }
}

/// Write one event. Returns `false` when the connection is unusable, in
/// which case the event is parked in `pending`.
async fn send_event<Si>(write: &mut Si, event: ClientEvent, pending: &mut Option<ClientEvent>) -> bool
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let json = match event.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode {event:?}: {e}");
            return true;
        }
    };
    debug!("Sending {json}");
    match write.send(Message::Text(json.into())).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send {event:?}: {e}; holding it for the next connection");
            *pending = Some(event);
            false
        }
    }
}
