use crate::rooms::{self, ConnId, Inbox, RelayState};
use futures_util::{SinkExt, StreamExt};
use simnet_core::message::Meta;
use simnet_core::{ClientMessage, ServerMessage};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

const JOIN_REQUIRED: &str = "First message must be JOIN";

type WsSender = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>;
type WsReceiver = futures_util::stream::SplitStream<WebSocketStream<TcpStream>>;

/// Start the presence WebSocket server. Returns the bound address, which
/// differs from `addr` when port 0 is requested.
pub async fn start_websocket_server(
    addr: SocketAddr,
    state: RelayState,
) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("🌐 Presence WebSocket server listening on {}", local_addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("📱 WebSocket client connected: {}", peer_addr);
                    let state = state.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, state).await {
                            warn!("WebSocket connection error: {}", e);
                        }
                        debug!("📱 WebSocket client disconnected: {}", peer_addr);
                    });
                }
                Err(e) => {
                    error!("Failed to accept WebSocket connection: {}", e);
                }
            }
        }
    });

    Ok(local_addr)
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: RelayState,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (room, user, meta) = match read_join(&mut ws_sender, &mut ws_receiver).await? {
        Opening::Join { room, user, meta } => {
            (room, user.unwrap_or_else(|| peer_addr.to_string()), meta)
        }
        Opening::NotJoin => {
            debug!("Rejecting {}: first frame was not JOIN", peer_addr);
            send(&mut ws_sender, &ServerMessage::error(JOIN_REQUIRED)).await?;
            ws_sender.close().await?;
            return Ok(());
        }
        Opening::Gone => return Ok(()),
    };

    let (outbox, mut inbox) = rooms::outbox();
    let conn = state.join(&room, &user, meta, outbox).await;
    let seat = Seat { room, user, conn };

    let result = relay_loop(&mut ws_sender, &mut ws_receiver, &mut inbox, &state, &seat)
        .await;

    state.leave(&seat.room, &seat.user, seat.conn).await;
    let _ = ws_sender.close().await;
    result
}

/// Where a joined connection sits.
struct Seat {
    room: String,
    user: String,
    conn: ConnId,
}

/// Pump frames both ways until the client leaves or the socket closes.
/// Also stops once the membership is gone: taken over by a newer connection,
/// or dropped for not draining its outbox.
async fn relay_loop(
    ws_sender: &mut WsSender,
    ws_receiver: &mut WsReceiver,
    inbox: &mut Inbox,
    state: &RelayState,
    seat: &Seat,
) -> anyhow::Result<()> {
    let (room, user) = (seat.room.as_str(), seat.user.as_str());
    loop {
        tokio::select! {
            outgoing = inbox.recv() => {
                match outgoing {
                    Some(msg) => send(ws_sender, &msg).await?,
                    None => {
                        debug!("{} in {} lost its membership", user, room);
                        break;
                    }
                }
            }

            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                        Ok(ClientMessage::Leave) => break,
                        Ok(ClientMessage::MetaUpdate { meta }) => {
                            state.update_meta(room, user, seat.conn, meta).await;
                        }
                        Ok(ClientMessage::Join { .. }) => {
                            debug!("Ignoring repeated JOIN from {}", user);
                        }
                        Ok(signal) => {
                            if let Some((kind, target, payload)) = signal.as_signal() {
                                state.relay(room, user, kind, target, payload).await;
                            }
                        }
                        Err(e) => debug!("Ignoring invalid frame from {}: {}", user, e),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        ws_sender.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("WebSocket receive error from {}: {}", user, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

/// How a connection opened.
enum Opening {
    Join {
        room: String,
        user: Option<String>,
        meta: Meta,
    },
    NotJoin,
    /// Closed before sending anything.
    Gone,
}

/// Wait for the first data frame and check that it is a JOIN.
async fn read_join(
    ws_sender: &mut WsSender,
    ws_receiver: &mut WsReceiver,
) -> anyhow::Result<Opening> {
    while let Some(msg) = ws_receiver.next().await {
        match msg? {
            Message::Text(text) => {
                return Ok(match ClientMessage::parse(&text) {
                    Ok(ClientMessage::Join { room, user, meta }) => {
                        Opening::Join { room, user, meta }
                    }
                    _ => Opening::NotJoin,
                });
            }
            Message::Binary(_) => return Ok(Opening::NotJoin),
            Message::Ping(data) => ws_sender.send(Message::Pong(data)).await?,
            Message::Close(_) => return Ok(Opening::Gone),
            _ => {}
        }
    }
    Ok(Opening::Gone)
}

async fn send(ws_sender: &mut WsSender, msg: &ServerMessage) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    ws_sender.send(Message::Text(json)).await?;
    Ok(())
}
