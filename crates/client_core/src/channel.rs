use std::sync::Mutex;

use futures::{SinkExt, StreamExt};
use shared::protocol::SocketEvent;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("event channel {url} is closed")]
    Closed { url: String },
    #[error("failed to encode socket event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to connect event channel {url}: {source}")]
    Connect {
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("cannot derive websocket url from {0}")]
    InvalidUrl(String),
}

pub trait EventChannel: Send + Sync {
    fn send(&self, event: &SocketEvent) -> Result<(), ChannelError>;
}

pub fn websocket_url(api_base: &Url, path: &str) -> Result<Url, ChannelError> {
    let scheme = match api_base.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        _ => return Err(ChannelError::InvalidUrl(api_base.to_string())),
    };
    let mut url = api_base
        .join(path)
        .map_err(|_| ChannelError::InvalidUrl(format!("{api_base} + {path}")))?;
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::InvalidUrl(api_base.to_string()))?;
    Ok(url)
}

/// Write side of a WebSocket. Inbound frames are drained and ignored.
pub struct WsEventChannel {
    url: String,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl WsEventChannel {
    pub async fn connect(url: &str) -> Result<Self, ChannelError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|source| ChannelError::Connect {
                url: url.to_string(),
                source,
            })?;
        info!(url, "event channel connected");
        let (mut writer, mut reader) = ws_stream.split();
        let (outbound, mut queued) = mpsc::unbounded_channel::<String>();

        let writer_url = url.to_string();
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = queued.recv().await {
                if let Err(err) = writer.send(Message::Text(frame)).await {
                    warn!(url = %writer_url, error = %err, "event channel write failed");
                    break;
                }
            }
            let _ = writer.close().await;
        });

        let reader_url = url.to_string();
        tokio::spawn(async move {
            while let Some(msg) = reader.next().await {
                match msg {
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        debug!(url = %reader_url, error = %err, "event channel read failed");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            url: url.to_string(),
            outbound: Mutex::new(Some(outbound)),
            writer: Mutex::new(Some(writer_task)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stops accepting events and waits until everything already queued has
    /// been written and the socket closed.
    pub async fn close(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        let writer = self.writer.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(writer) = writer {
            if let Err(err) = writer.await {
                warn!(url = %self.url, error = %err, "event channel writer failed");
            }
        }
    }
}

impl EventChannel for WsEventChannel {
    fn send(&self, event: &SocketEvent) -> Result<(), ChannelError> {
        let frame = serde_json::to_string(event)?;
        let closed = || ChannelError::Closed {
            url: self.url.clone(),
        };
        self.outbound
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .ok_or_else(closed)?
            .send(frame)
            .map_err(|_| closed())
    }
}
