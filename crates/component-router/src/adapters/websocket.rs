//! WebSocket transport over tokio-tungstenite.
//!
//! Each connection runs on its own task: connect (bounded by the connect
//! timeout), then pump queued outbound frames and inbound JSON text frames
//! until either side closes.

use crate::domain::Endpoint;
use crate::ports::{Transport, TransportConnection, TransportError, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Opens one WebSocket per channel.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
    runtime: Handle,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration, runtime: Handle) -> Self {
        Self {
            connect_timeout,
            runtime,
        }
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &self,
        endpoint: &Endpoint,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportConnection>, TransportError> {
        let request = endpoint
            .url()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let (outbound, queue) = mpsc::unbounded_channel();
        self.runtime
            .spawn(run_connection(request, self.connect_timeout, events, queue));
        Ok(Box::new(WebSocketConnection { outbound }))
    }
}

enum Outbound {
    Frame(String),
    Close,
}

struct WebSocketConnection {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TransportConnection for WebSocketConnection {
    fn emit(&self, frame: Value) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(&frame).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.outbound
            .send(Outbound::Frame(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

async fn run_connection(
    request: Request,
    connect_timeout: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
) {
    let uri = request.uri().to_string();
    let stream = match tokio::time::timeout(connect_timeout, connect_async(request)).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            let _ = events.send(TransportEvent::ConnectError(e.to_string()));
            return;
        }
        Err(_) => {
            let _ = events.send(TransportEvent::ConnectTimeout);
            return;
        }
    };

    debug!(uri = %uri, "websocket connected");
    let _ = events.send(TransportEvent::Connected);
    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            command = queue.recv() => match command {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        break e.to_string();
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break "closed by client".to_owned();
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                    Ok(frame) => {
                        let _ = events.send(TransportEvent::Frame(frame));
                    }
                    Err(e) => warn!(uri = %uri, error = %e, "ignoring non-JSON frame"),
                },
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break "closed by server".to_owned(),
                Some(Err(e)) => break e.to_string(),
                Some(Ok(_)) => {}
            },
        }
    };

    debug!(uri = %uri, reason = %reason, "websocket closed");
    let _ = events.send(TransportEvent::Disconnected { reason });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_endpoint_rejected() {
        let transport = WebSocketTransport::new(Duration::from_secs(1), Handle::current());
        let (events, _receiver) = mpsc::unbounded_channel();
        let result = transport.open(&Endpoint::new("bad host name", 9000), events);
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_connect_error() {
        let transport = WebSocketTransport::new(Duration::from_secs(5), Handle::current());
        let (events, mut receiver) = mpsc::unbounded_channel();
        // Port 1 on loopback refuses connections.
        let connection = transport.open(&Endpoint::new("127.0.0.1", 1), events).unwrap();

        match receiver.recv().await {
            Some(TransportEvent::ConnectError(_)) => {}
            other => panic!("unexpected event {other:?}"),
        }
        drop(connection);
    }
}
