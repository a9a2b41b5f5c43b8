use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};
use url::Url;

use crate::error::ConnectionError;

const FRAME_BUFFER: usize = 256;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An established realtime channel, as a pair of text-frame queues.
///
/// Dropping it closes the underlying connection. `incoming` ends (yields
/// `None`) when the peer closes; a transport error is delivered as `Err`
/// before the end.
pub struct Transport {
    pub outgoing: mpsc::Sender<String>,
    pub incoming: mpsc::Receiver<Result<String, ConnectionError>>,
}

/// Opens realtime channels. `url` already carries the `auth` query parameter.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &Url) -> impl Future<Output = Result<Transport, ConnectionError>> + Send;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Transport, ConnectionError> {
        let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
            .await
            .map_err(|_| ConnectionError::NetworkFailure("connect timed out".into()))?
            .map_err(|e| ConnectionError::NetworkFailure(e.to_string()))?;

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(FRAME_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(FRAME_BUFFER);

        // Writer: ends when the Transport is dropped, which closes the socket.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!("WebSocket write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader: forwards text frames until close, error, or nobody listens.
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let item = match frame {
                    Ok(Message::Text(text)) => Ok(text.as_str().to_owned()),
                    Ok(Message::Close(close)) => {
                        debug!("Gateway closed the socket: {:?}", close);
                        break;
                    }
                    Ok(other) => {
                        trace!("Ignoring non-text frame: {:?}", other);
                        continue;
                    }
                    Err(e) => Err(ConnectionError::NetworkFailure(e.to_string())),
                };
                let failed = item.is_err();
                if in_tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Transport {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
