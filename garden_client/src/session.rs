use crate::cache::ReconciliationCache;
use crate::gate::{Clock, InteractionGate, SystemClock};
use crate::interpolator::MotionEvent;
use crate::view::WorldView;

use futures_util::{SinkExt, StreamExt};
use garden_shared::{ClientEvent, Point, ServerEvent};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{info, warn};

const FRAME_INTERVAL: Duration = Duration::from_millis(1000 / 60);

// Animations advance by measured wall time, not the nominal frame
// interval, so a late-firing interval does not slow them down.
struct FrameClock {
    last: Instant,
}

impl FrameClock {
    fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    fn dt_secs(&mut self) -> f64 {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        dt
    }
}

/// Everything a session needs up front. No global state; a new config
/// makes a new session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base websocket URL, e.g. `ws://127.0.0.1:3000`.
    pub server_url: String,
    pub uid: String,
    pub creature_name: String,
    pub admin: bool,
    pub viewport: (f64, f64),
}

/// How a session finished. There is no in-place resume: a severed
/// transport means the caller starts over with a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The transport dropped or the server closed on us.
    Reload,
    /// The caller suspended the session (window went to background).
    Suspended,
}

/// Intents flowing from the UI into the running session.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    GardenTap(Point),
    Evolve(String),
    Suspend,
}

#[derive(Debug)]
pub enum SessionError {
    InvalidUrl(url::ParseError),
    Serialization(serde_json::Error),
    Ws(WsError),
}

impl From<url::ParseError> for SessionError {
    fn from(e: url::ParseError) -> Self {
        SessionError::InvalidUrl(e)
    }
}

impl From<WsError> for SessionError {
    fn from(e: WsError) -> Self {
        SessionError::Ws(e)
    }
}

/// Transport-free synchronization core: applies server events to the
/// cache, keeps the culled view in step, and gates outbound intents.
/// The async driver owns one; tests drive it directly.
#[derive(Debug)]
pub struct SessionState<C: Clock = SystemClock> {
    admin: bool,
    cache: ReconciliationCache,
    view: WorldView,
    gate: InteractionGate<C>,
}

impl SessionState<SystemClock> {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> SessionState<C> {
    pub fn with_clock(config: &SessionConfig, clock: C) -> Self {
        Self {
            admin: config.admin,
            cache: ReconciliationCache::new(&config.uid, config.viewport),
            view: WorldView::new(config.admin),
            gate: InteractionGate::new(clock),
        }
    }

    pub fn apply_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::UsersUpdate(users) => {
                self.cache.on_users_update(users);
                self.view.refresh(&self.cache);
            }
            ServerEvent::Creatures(encoded) => {
                self.cache.on_creatures_snapshot(&encoded);
                self.view.refresh(&self.cache);
            }
            ServerEvent::CreaturesUpdate(changed) => {
                self.cache.on_creatures_update(changed);
                self.view.refresh(&self.cache);
            }
            ServerEvent::AdminConnectBroadcast {} => {
                // An admin joining reshapes everyone's world; regular
                // viewers start from a clean slate and wait for fresh
                // snapshots. Admins ignore their own announcement.
                if !self.admin {
                    self.reset();
                }
            }
            ServerEvent::CreatureEvolveBroadcast { id } => {
                self.view.on_evolve_broadcast(&id);
            }
        }
    }

    /// Gated tap: dropped until both snapshots have arrived, then
    /// debounced by the interaction gate.
    pub fn tap(&mut self, coords: Point) -> Option<ClientEvent> {
        if !self.cache.is_ready() {
            return None;
        }
        self.gate.try_garden_tap(coords)
    }

    pub fn evolve(&self, id: &str) -> ClientEvent {
        self.gate.try_evolve(id)
    }

    pub fn tick(&mut self, dt: f64) -> Vec<(String, MotionEvent)> {
        self.view.tick(dt)
    }

    pub fn reset(&mut self) {
        self.cache.reset();
        self.view.reset();
    }

    pub fn cache(&self) -> &ReconciliationCache {
        &self.cache
    }

    pub fn view(&self) -> &WorldView {
        &self.view
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected session: the sync core plus its websocket transport.
pub struct Session {
    state: SessionState,
    ws: WsStream,
}

impl Session {
    /// Performs the handshake and, for admin sessions, announces the
    /// admin immediately.
    pub async fn connect(config: SessionConfig) -> Result<Self, SessionError> {
        let mut url = url::Url::parse(&config.server_url)?;
        url.set_path("/ws");
        url.query_pairs_mut()
            .append_pair("uid", &config.uid)
            .append_pair("creatureName", &config.creature_name)
            .append_pair("width", &config.viewport.0.to_string())
            .append_pair("height", &config.viewport.1.to_string());

        let (mut ws, _) = connect_async(url.as_str()).await?;
        info!(uid = %config.uid, admin = config.admin, "session connected");

        if config.admin {
            send(&mut ws, &ClientEvent::AdminConnect {}).await?;
        }

        Ok(Self {
            state: SessionState::new(&config),
            ws,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs the session to completion: server events and UI intents in,
    /// motion completions out on `motion_tx`. Returns how it ended; the
    /// caller decides whether to build a fresh session.
    pub async fn run(
        mut self,
        mut intents: mpsc::Receiver<Intent>,
        motion_tx: mpsc::Sender<(String, MotionEvent)>,
    ) -> SessionEnd {
        let mut frames = tokio::time::interval(FRAME_INTERVAL);
        let mut frame_clock = FrameClock::new();

        loop {
            tokio::select! {
                incoming = self.ws.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerEvent>(text.as_str()) {
                                Ok(event) => self.state.apply_server_event(event),
                                Err(e) => {
                                    warn!(error = %e, "unparseable server event; skipping");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("server closed the session");
                            return SessionEnd::Reload;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "transport error; session is over");
                            return SessionEnd::Reload;
                        }
                    }
                }

                intent = intents.recv() => {
                    match intent {
                        Some(Intent::GardenTap(coords)) => {
                            if let Some(event) = self.state.tap(coords) {
                                if self.send_event(&event).await.is_err() {
                                    return SessionEnd::Reload;
                                }
                            }
                        }
                        Some(Intent::Evolve(id)) => {
                            let event = self.state.evolve(&id);
                            if self.send_event(&event).await.is_err() {
                                return SessionEnd::Reload;
                            }
                        }
                        Some(Intent::Suspend) | None => {
                            // Background teardown: drop the transport and
                            // the world; resuming means reconnecting.
                            let _ = self.ws.close(None).await;
                            self.state.reset();
                            return SessionEnd::Suspended;
                        }
                    }
                }

                _ = frames.tick() => {
                    let dt = frame_clock.dt_secs();
                    for event in self.state.tick(dt) {
                        let _ = motion_tx.send(event).await;
                    }
                }
            }
        }
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), SessionError> {
        send(&mut self.ws, event).await
    }
}

async fn send(ws: &mut WsStream, event: &ClientEvent) -> Result<(), SessionError> {
    let payload = serde_json::to_string(event).map_err(SessionError::Serialization)?;
    ws.send(Message::Text(payload.into()))
        .await
        .map_err(SessionError::from)
}
