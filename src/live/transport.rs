//! Push transport
//!
//! The channel only sees a pair of text queues. The WebSocket connector
//! bridges them to a tokio-tungstenite stream with one reader and one writer
//! task; either side closing ends the link.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::Result;

const INBOUND_BUFFER: usize = 64;

/// An open push connection.
///
/// The connection is considered closed once `inbound` yields `None`.
/// Dropping `outbound` closes the underlying transport. Outbound control
/// frames are never refused while the link is up.
pub struct PushLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::Receiver<String>,
}

impl PushLink {
    /// Two linked ends: the channel's link and the remote side's
    /// `(inbound_tx, outbound_rx)`
    pub fn pair() -> (Self, mpsc::Sender<String>, mpsc::UnboundedReceiver<String>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let link = PushLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        };
        (link, inbound_tx, outbound_rx)
    }
}

/// Opens push connections (one per attempt)
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> Result<PushLink>;
}

pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushConnector for WebSocketConnector {
    async fn connect(&self) -> Result<PushLink> {
        let (ws, _) = connect_async(self.url.as_str()).await?;
        let (mut ws_sink, mut ws_stream) = ws.split();
        info!(url = %self.url, "Live endpoint connected");

        let (link, inbound_tx, mut outbound_rx) = PushLink::pair();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(text)).await {
                    warn!(error = %e, "Live endpoint send failed");
                    break;
                }
            }
            let _ = ws_sink.close().await;
            debug!("Live writer ended");
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        info!(frame = ?frame, "Live endpoint closed connection");
                        break;
                    }
                    Ok(Message::Binary(_)) => {
                        debug!("Ignoring binary live frame");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Live endpoint read failed");
                        break;
                    }
                }
            }
            debug!("Live reader ended");
        });

        Ok(link)
    }
}
