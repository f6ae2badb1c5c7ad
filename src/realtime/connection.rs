// src/realtime/connection.rs
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Wire frames of the gateway protocol, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    Hello { token: String, client: String },
    Welcome { session: Option<String> },
    Join { room: String },
    Leave { room: String },
    Event(super::event::GatewayEvent),
    Ping,
    Pong,
    Error { message: String },
}

type GatewayStream = Box<dyn Stream>;

/// Object-safe alias so plain TCP and TLS share one connection type.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub struct GatewayConnection {
    reader: Mutex<FramedRead<ReadHalf<GatewayStream>, LinesCodec>>,
    writer: Mutex<FramedWrite<WriteHalf<GatewayStream>, LinesCodec>>,
    server_id: String,
}

impl GatewayConnection {
    /// Connect, upgrade to TLS when configured, and authenticate.
    ///
    /// The first frame after `hello` must be `welcome`; anything else is a
    /// handshake failure and the caller reconnects with backoff.
    pub async fn connect(
        host: &str,
        port: u16,
        tls: bool,
        token: &str,
        client_host: &str,
    ) -> Result<Self, EngineError> {
        let server_id = format!("{}:{}", host, port);
        info!("Connecting to realtime gateway: {}", server_id);

        let tcp = TcpStream::connect((host, port)).await?;

        let stream: GatewayStream = if tls {
            let connector = native_tls::TlsConnector::new()
                .map_err(|e| EngineError::GatewayConnection(e.to_string()))?;
            let connector = tokio_native_tls::TlsConnector::from(connector);
            let tls_stream = connector
                .connect(host, tcp)
                .await
                .map_err(|e| EngineError::GatewayConnection(e.to_string()))?;
            Box::new(tls_stream)
        } else {
            Box::new(tcp)
        };

        let (read_half, write_half) = tokio::io::split(stream);
        let connection = Self {
            reader: Mutex::new(FramedRead::new(read_half, LinesCodec::new())),
            writer: Mutex::new(FramedWrite::new(write_half, LinesCodec::new())),
            server_id,
        };

        connection
            .send_frame(&GatewayFrame::Hello {
                token: token.to_string(),
                client: client_host.to_string(),
            })
            .await?;

        match connection.read_frame().await? {
            Some(GatewayFrame::Welcome { .. }) => {
                info!("Authenticated to gateway: {}", connection.server_id);
                Ok(connection)
            }
            Some(GatewayFrame::Error { message }) => Err(EngineError::GatewayHandshake(message)),
            Some(other) => Err(EngineError::GatewayHandshake(format!(
                "unexpected frame before welcome: {:?}",
                other
            ))),
            None => Err(EngineError::GatewayHandshake(
                "connection closed during handshake".to_string(),
            )),
        }
    }

    /// Read the next frame. `None` means the gateway closed the connection.
    ///
    /// Unparseable lines are logged and skipped; one bad payload must not
    /// tear the channel down.
    pub async fn read_frame(&self) -> Result<Option<GatewayFrame>, EngineError> {
        let mut reader = self.reader.lock().await;

        loop {
            match reader.next().await {
                Some(Ok(line)) => match serde_json::from_str::<GatewayFrame>(&line) {
                    Ok(frame) => {
                        debug!("Gateway frame from {}: {:?}", self.server_id, frame);
                        return Ok(Some(frame));
                    }
                    Err(e) => {
                        warn!("Skipping malformed gateway frame: {} ({})", line, e);
                        continue;
                    }
                },
                Some(Err(e)) => return Err(EngineError::GatewayConnection(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    pub async fn send_frame(&self, frame: &GatewayFrame) -> Result<(), EngineError> {
        let line = serde_json::to_string(frame)?;
        let mut writer = self.writer.lock().await;
        writer
            .send(line)
            .await
            .map_err(|e| EngineError::GatewayConnection(e.to_string()))
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }
}
