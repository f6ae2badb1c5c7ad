// src/realtime/client.rs
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use super::connection::{GatewayConnection, GatewayFrame};
use super::event::GatewayEvent;
use crate::config::RealtimeServer;

const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Reconnecting gateway client.
///
/// Holds a registry of room-join intents. Every successful handshake
/// replays exactly the currently-registered set, so subscriptions survive
/// reconnects without the caller doing anything. There is no outbound
/// queue: emitting while disconnected drops the frame and the REST poll
/// recovers whatever was missed.
pub struct RealtimeClient {
    server: RealtimeServer,
    token: String,
    client_host: String,
    registry: RwLock<BTreeSet<String>>,
    events_tx: broadcast::Sender<GatewayEvent>,
    outbound_tx: mpsc::UnboundedSender<GatewayFrame>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<GatewayFrame>>>,
    connected: AtomicBool,
    shutting_down: AtomicBool,
}

impl RealtimeClient {
    pub fn new(server: RealtimeServer, token: String) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let client_host = crate::client_host().to_string();

        Arc::new(Self {
            server,
            token,
            client_host,
            registry: RwLock::new(BTreeSet::new()),
            events_tx,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            connected: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Subscribe to inbound application events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Register a room-join intent and join now if connected.
    ///
    /// Registering an already-registered room is a no-op; the replay set
    /// never holds duplicates.
    pub async fn join(&self, room: &str) {
        let mut registry = self.registry.write().await;
        if !registry.insert(room.to_string()) {
            debug!("Room already registered: {}", room);
            return;
        }
        drop(registry);

        if self.is_connected() {
            let _ = self.outbound_tx.send(GatewayFrame::Join {
                room: room.to_string(),
            });
        }
    }

    /// Drop a room-join intent so future reconnects no longer replay it.
    pub async fn leave(&self, room: &str) {
        let mut registry = self.registry.write().await;
        if !registry.remove(room) {
            return;
        }
        drop(registry);

        if self.is_connected() {
            let _ = self.outbound_tx.send(GatewayFrame::Leave {
                room: room.to_string(),
            });
        }
    }

    pub async fn rooms(&self) -> Vec<String> {
        self.registry.read().await.iter().cloned().collect()
    }

    /// Best-effort emit. Dropped with a warning when disconnected.
    pub fn emit(&self, event: GatewayEvent) {
        if !self.is_connected() {
            warn!("Gateway disconnected, dropping outbound event: {}", event.event);
            return;
        }
        let _ = self.outbound_tx.send(GatewayFrame::Event(event));
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Reconnect-forever loop. Spawn once; runs until `shutdown()`.
    pub async fn run(self: Arc<Self>) {
        let mut outbound_rx = self
            .outbound_rx
            .lock()
            .await
            .take()
            .expect("RealtimeClient::run called twice");

        let server_id = format!("{}:{}", self.server.host, self.server.port);
        let mut backoff = RECONNECT_MIN;

        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                info!("Gateway client shut down: {}", server_id);
                return;
            }

            match self.connect_and_listen(&mut outbound_rx).await {
                Ok(()) => {
                    info!("Gateway connection closed: {}", server_id);
                }
                Err(e) => {
                    error!("Gateway error for {}: {}", server_id, e);
                }
            }

            // A handshake that succeeded earns a fresh backoff.
            if self.connected.swap(false, Ordering::SeqCst) {
                backoff = RECONNECT_MIN;
            }

            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }

            warn!("Reconnecting to {} in {:?}...", server_id, backoff);
            sleep(backoff).await;
            backoff = (backoff * 2).min(RECONNECT_MAX);
        }
    }

    async fn connect_and_listen(
        &self,
        outbound_rx: &mut mpsc::UnboundedReceiver<GatewayFrame>,
    ) -> Result<(), crate::error::EngineError> {
        let connection = GatewayConnection::connect(
            &self.server.host,
            self.server.port,
            self.server.tls,
            &self.token,
            &self.client_host,
        )
        .await?;

        self.connected.store(true, Ordering::SeqCst);

        // Replay the registered joins, each exactly once.
        let rooms: Vec<String> = self.registry.read().await.iter().cloned().collect();
        for room in &rooms {
            connection
                .send_frame(&GatewayFrame::Join { room: room.clone() })
                .await?;
        }
        if !rooms.is_empty() {
            info!("Replayed {} room join(s) after connect", rooms.len());
        }

        loop {
            tokio::select! {
                inbound = connection.read_frame() => {
                    match inbound? {
                        Some(frame) => self.dispatch(&connection, frame).await?,
                        None => return Ok(()),
                    }
                }
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(frame) => connection.send_frame(&frame).await?,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn dispatch(
        &self,
        connection: &GatewayConnection,
        frame: GatewayFrame,
    ) -> Result<(), crate::error::EngineError> {
        match frame {
            GatewayFrame::Event(event) => {
                debug!("Gateway event: {}", event.event);
                // No receivers is fine, e.g. during startup.
                let _ = self.events_tx.send(event);
            }
            GatewayFrame::Ping => {
                connection.send_frame(&GatewayFrame::Pong).await?;
            }
            GatewayFrame::Error { message } => {
                warn!("Gateway error frame: {}", message);
            }
            other => {
                debug!("Ignoring gateway frame: {:?}", other);
            }
        }
        Ok(())
    }
}
