use crate::interface_adapters::state::AppState;
use crate::use_cases::{ConnectSnapshot, PresenceCommand, PresenceUpdate};

use axum::{
    Error, Json,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::SinkExt;
use garden_shared::{ClientEvent, Point, ServerEvent, encode_creatures};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Connection lifecycle failures, kept coarse; the loop only needs to
    // know whether to keep serving or tear down.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    CommandClosed,
    EventsClosed,
    RegistryUnavailable,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_UID_LEN: usize = 128;
const MAX_CREATURE_ID_LEN: usize = 64;
const CONNECT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);
// Fallback garden extent when the client reports no viewport.
const DEFAULT_VIEWPORT: (f64, f64) = (1000.0, 1000.0);

#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
}

/// Handshake query parameters: the opaque identity token plus display
/// name and viewport extent used to build the initial User record.
#[derive(Debug, serde::Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    uid: Option<String>,
    #[serde(default, rename = "creatureName")]
    creature_name: Option<String>,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
}

/// Serializes each presence update once and fans the shared bytes out to
/// every connection; also refreshes the latest-snapshot watches used for
/// connection lag recovery.
pub async fn presence_event_serializer(
    mut updates_rx: broadcast::Receiver<PresenceUpdate>,
    event_bytes_tx: broadcast::Sender<Utf8Bytes>,
    users_latest_tx: watch::Sender<Utf8Bytes>,
    creatures_latest_tx: watch::Sender<Utf8Bytes>,
) {
    loop {
        match updates_rx.recv().await {
            Ok(update) => match update {
                PresenceUpdate::Users(users) => {
                    let Some(bytes) = serialize_event(&ServerEvent::UsersUpdate(users)) else {
                        continue;
                    };
                    let _ = users_latest_tx.send(bytes.clone());
                    let _ = event_bytes_tx.send(bytes);
                }
                PresenceUpdate::Creatures { changed, full } => {
                    // Full snapshot only refreshes the recovery watch; the
                    // live broadcast carries the incremental delta.
                    if let Some(snapshot) =
                        serialize_event(&ServerEvent::Creatures(encode_creatures(&full)))
                    {
                        let _ = creatures_latest_tx.send(snapshot);
                    }
                    if changed.is_empty() {
                        continue;
                    }
                    if let Some(bytes) = serialize_event(&ServerEvent::CreaturesUpdate(changed)) {
                        let _ = event_bytes_tx.send(bytes);
                    }
                }
                PresenceUpdate::AdminJoined => {
                    if let Some(bytes) = serialize_event(&ServerEvent::AdminConnectBroadcast {}) {
                        let _ = event_bytes_tx.send(bytes);
                    }
                }
                PresenceUpdate::Evolved { id } => {
                    if let Some(bytes) = serialize_event(&ServerEvent::CreatureEvolveBroadcast { id })
                    {
                        let _ = event_bytes_tx.send(bytes);
                    }
                }
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "event serializer lagged; skipping to latest");
            }
            Err(broadcast::error::RecvError::Closed) => {
                warn!("presence updates channel closed; serializer exiting");
                break;
            }
        }
    }
}

fn serialize_event(event: &ServerEvent) -> Option<Utf8Bytes> {
    match serde_json::to_string(event) {
        Ok(txt) => Some(Utf8Bytes::from(txt)),
        Err(e) => {
            error!(error = ?e, "failed to serialize presence event");
            None
        }
    }
}

fn next_conn_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    // Identity is an opaque pre-issued token; refuse malformed or missing
    // tokens before the connection reaches the registry.
    let uid = match query.uid.as_deref().map(str::trim) {
        Some(uid) if !uid.is_empty() && uid.len() <= MAX_UID_LEN => uid.to_string(),
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "missing or invalid uid".to_string(),
                }),
            )
                .into_response();
        }
    };

    let creature_name = query.creature_name.unwrap_or_default();
    let viewport = sanitize_viewport(query.width, query.height);

    ws.on_upgrade(move |socket| handle_socket(socket, state, uid, creature_name, viewport))
}

fn sanitize_viewport(width: Option<f64>, height: Option<f64>) -> (f64, f64) {
    let pick = |value: Option<f64>, fallback: f64| match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => fallback,
    };
    (
        pick(width, DEFAULT_VIEWPORT.0),
        pick(height, DEFAULT_VIEWPORT.1),
    )
}

async fn handle_socket(
    mut socket: WebSocket,
    state: AppState,
    uid: String,
    creature_name: String,
    viewport: (f64, f64),
) {
    let conn_id = next_conn_id();
    let span = info_span!("conn", conn_id, uid = %uid);
    let _enter = span.enter();

    let mut ctx = match bootstrap_connection(&mut socket, &state, conn_id, uid, creature_name, viewport)
        .await
    {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = ?e, "failed to bootstrap connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "bootstrap failed".into(),
                })))
                .await;
            let _ = socket.close().await;
            // The registry may already hold this connection; make sure it
            // does not leak a ghost user.
            let _ = state
                .command_tx
                .send(PresenceCommand::Disconnect { conn_id })
                .await;
            return;
        }
    };

    info!("client connected");
    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }
}

struct ConnCtx {
    conn_id: u64,
    is_admin: bool,
    command_tx: mpsc::Sender<PresenceCommand>,
    event_bytes_rx: broadcast::Receiver<Utf8Bytes>,
    users_latest_rx: watch::Receiver<Utf8Bytes>,
    creatures_latest_rx: watch::Receiver<Utf8Bytes>,

    msgs_in: u64,
    msgs_out: u64,
    invalid_json: u32,
    lag_recovery_count: u64,

    last_lag_log: Instant,
    last_invalid_log: Instant,
    close_frame: Option<CloseFrame>,
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    state: &AppState,
    conn_id: u64,
    uid: String,
    creature_name: String,
    viewport: (f64, f64),
) -> Result<ConnCtx, NetError> {
    // Subscribe to the fan-out *before* registering so no update between
    // admission and the first poll is missed.
    let event_bytes_rx = state.event_bytes_tx.subscribe();
    let users_latest_rx = state.users_latest_tx.subscribe();
    let creatures_latest_rx = state.creatures_latest_tx.subscribe();

    let (reply, reply_rx) = oneshot::channel();
    state
        .command_tx
        .send(PresenceCommand::Connect {
            conn_id,
            uid,
            creature_name,
            viewport,
            reply,
        })
        .await
        .map_err(|_| NetError::CommandClosed)?;

    let snapshot: ConnectSnapshot = match timeout(CONNECT_REPLY_TIMEOUT, reply_rx).await {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(_)) | Err(_) => return Err(NetError::RegistryUnavailable),
    };

    // Bootstrap sends both snapshot kinds; afterwards everything is live
    // patches through the shared broadcast.
    send_event(socket, &ServerEvent::UsersUpdate(snapshot.users)).await?;
    send_event(
        socket,
        &ServerEvent::Creatures(encode_creatures(&snapshot.creatures)),
    )
    .await?;

    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        conn_id,
        is_admin: false,
        command_tx: state.command_tx.clone(),
        event_bytes_rx,
        users_latest_rx,
        creatures_latest_rx,
        msgs_in: 0,
        msgs_out: 2,
        invalid_json: 0,
        lag_recovery_count: 0,
        last_lag_log: now,
        last_invalid_log: now,
        close_frame: None,
    })
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), NetError> {
    let txt = serde_json::to_string(event).map_err(NetError::Serialization)?;
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)
}

enum LoopControl {
    Continue,
    Disconnect,
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let disconnect: bool = tokio::select! {
            // Incoming intent from the client.
            incoming = socket.recv() => {
                match handle_incoming_ws(incoming, ctx).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Outgoing presence event. Delivery is fire-and-forget per
            // socket; a slow receiver only lags its own subscription.
            event = ctx.event_bytes_rx.recv() => {
                match event {
                    Ok(bytes) => match forward_bytes(bytes, socket, &mut ctx.msgs_out).await {
                        LoopControl::Continue => false,
                        LoopControl::Disconnect => true,
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(&mut ctx.last_lag_log) {
                            warn!(missed = n, "presence events lagged; resyncing from snapshots");
                        }
                        ctx.lag_recovery_count += 1;
                        match resync_from_snapshots(socket, ctx).await {
                            LoopControl::Continue => false,
                            LoopControl::Disconnect => true,
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::EventsClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    if let Err(e) = disconnect_cleanup(ctx).await {
        warn!(error = ?e, "error during disconnect cleanup");
        if fatal.is_none() {
            fatal = Some(e);
        }
    }

    if let Some(err) = fatal { Err(err) } else { Ok(()) }
}

// A lagged receiver dropped whole events; replace its view with the
// latest serialized snapshots instead of replaying what was lost.
async fn resync_from_snapshots(socket: &mut WebSocket, ctx: &mut ConnCtx) -> LoopControl {
    let users = ctx.users_latest_rx.borrow().clone();
    let creatures = ctx.creatures_latest_rx.borrow().clone();

    for bytes in [users, creatures] {
        if bytes.is_empty() {
            continue;
        }
        if let LoopControl::Disconnect = forward_bytes(bytes, socket, &mut ctx.msgs_out).await {
            return LoopControl::Disconnect;
        }
    }
    LoopControl::Continue
}

async fn handle_incoming_ws(
    incoming: Option<Result<Message, Error>>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                ctx.msgs_in += 1;
                match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => forward_intent(event, ctx).await,
                    Err(parse_err) => {
                        ctx.invalid_json += 1;
                        if should_log(&mut ctx.last_invalid_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client event"
                            );
                        }
                        if ctx.invalid_json > MAX_INVALID_JSON {
                            ctx.close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }
                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn forward_intent(event: ClientEvent, ctx: &mut ConnCtx) -> Result<LoopControl, NetError> {
    let command = match event {
        ClientEvent::AdminConnect {} => {
            ctx.is_admin = true;
            PresenceCommand::AdminConnect {
                conn_id: ctx.conn_id,
            }
        }
        ClientEvent::GardenTap(coords) => {
            let Some(coords) = sanitize_coords(coords) else {
                if should_log(&mut ctx.last_invalid_log) {
                    warn!("invalid tap coordinates (NaN/inf); dropping");
                }
                return Ok(LoopControl::Continue);
            };
            PresenceCommand::GardenTap {
                conn_id: ctx.conn_id,
                coords,
            }
        }
        ClientEvent::CreatureEvolve { id } => {
            if id.is_empty() || id.len() > MAX_CREATURE_ID_LEN {
                if should_log(&mut ctx.last_invalid_log) {
                    warn!(bytes = id.len(), "invalid evolve id; dropping");
                }
                return Ok(LoopControl::Continue);
            }
            PresenceCommand::Evolve { id }
        }
    };

    match ctx.command_tx.try_send(command) {
        Ok(()) => Ok(LoopControl::Continue),
        Err(mpsc::error::TrySendError::Full(_)) => {
            if should_log(&mut ctx.last_invalid_log) {
                warn!("command channel full; dropping intent");
            }
            Ok(LoopControl::Continue)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(NetError::CommandClosed),
    }
}

fn sanitize_coords(coords: Point) -> Option<Point> {
    if coords.x.is_finite() && coords.y.is_finite() {
        Some(coords)
    } else {
        None
    }
}

async fn forward_bytes(
    bytes: Utf8Bytes,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
) -> LoopControl {
    match socket.send(Message::Text(bytes)).await.map_err(NetError::Ws) {
        Ok(()) => {
            *msgs_out += 1;
            LoopControl::Continue
        }
        Err(err) => {
            warn!(error = ?err, "failed to send presence event");
            LoopControl::Disconnect
        }
    }
}

async fn disconnect_cleanup(ctx: &mut ConnCtx) -> Result<(), NetError> {
    ctx.command_tx
        .send(PresenceCommand::Disconnect {
            conn_id: ctx.conn_id,
        })
        .await
        .map_err(|_| NetError::CommandClosed)?;

    debug!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        invalid_json = ctx.invalid_json,
        lag_recovery_count = ctx.lag_recovery_count,
        is_admin = ctx.is_admin,
        "connection stats"
    );
    info!("client disconnected");
    Ok(())
}
