//! Stream channel over tokio-tungstenite.

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::ports::outbound::{TransportChannel, TransportError, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Receive-only WebSocket channel; commands travel over the action endpoint.
#[derive(Default)]
pub struct WebSocketChannel {
    stream: Option<WsStream>,
}

impl WebSocketChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn closed(&mut self, reason: Option<String>) -> TransportEvent {
        self.stream = None;
        TransportEvent::Closed { reason }
    }
}

#[async_trait::async_trait]
impl TransportChannel for WebSocketChannel {
    async fn open(&mut self, address: &str) -> Result<(), TransportError> {
        if let Some(mut previous) = self.stream.take() {
            let _ = previous.close(None).await;
        }

        let (stream, _) = connect_async(address)
            .await
            .map_err(|e| TransportError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(address = %address, "Connected to backend stream");
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return TransportEvent::Closed {
                    reason: Some("not open".into()),
                };
            };

            match stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Frame(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return TransportEvent::Frame(text),
                    Err(_) => {
                        tracing::warn!("Dropping non-UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("Server closed connection");
                    return self.closed(frame.map(|frame| frame.reason.to_string()));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::error!("WebSocket error: {}", e);
                    return self.closed(Some(e.to_string()));
                }
                None => return self.closed(None),
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                tracing::debug!("Error while closing stream: {}", e);
            }
        }
    }
}
