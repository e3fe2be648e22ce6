//! # WebSocket Round Trips
//!
//! Runs the router over the real WebSocket transport against a local server
//! that answers both as the directory service and as the component it
//! resolves to (itself).

use component_router::channel::wire::WireRequest;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Lookup rpc answered with an address record.
pub const DIRECTORY_RPC: &str = "servicedirectory.getComponent";

/// Serve WebSocket connections on `listener` until the task is dropped.
///
/// Lookups resolve every component to the listener's own port; other rpcs
/// echo their parameters. The component `missing` is unknown to the
/// directory.
pub async fn serve(listener: TcpListener) {
    let Ok(local) = listener.local_addr() else {
        return;
    };
    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(async move {
            let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            let (mut write, mut read) = socket.split();
            while let Some(Ok(message)) = read.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let Ok(request) = serde_json::from_str::<WireRequest>(&text) else {
                    continue;
                };
                let params: Value = serde_json::from_str(&request.data).unwrap_or(Value::Null);
                let body = if request.rpc != DIRECTORY_RPC {
                    json!({"status": 200, "echo": params})
                } else if params["componentName"] == "missing" {
                    json!({"status": -5006, "msg": "unknown component"})
                } else {
                    json!({"status": 200, "componentIp": local.ip().to_string(), "nport": local.port()})
                };
                let frame = json!({"reqid": request.reqid, "response": body.to_string()});
                if write.send(Message::Text(frame.to_string().into())).await.is_err() {
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use component_router::adapters::{
        DirectoryDomains, ForegroundLoop, OneshotCallback, PlaintextCipher, StaticConnectivity,
        WebSocketTransport,
    };
    use component_router::{codes, Collaborators, RequestParams, Router, RouterConfig};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    async fn router() -> Router {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        tokio::spawn(serve(listener));

        let domains = DirectoryDomains::new(port);
        domains.add_domain("127.0.0.1");

        let collaborators = Collaborators {
            transport: Arc::new(WebSocketTransport::new(
                Duration::from_secs(5),
                Handle::current(),
            )),
            cipher: Arc::new(PlaintextCipher),
            connectivity: Arc::new(StaticConnectivity::online()),
            foreground: Arc::new(ForegroundLoop::spawn(&Handle::current())),
            domains: Arc::new(domains),
        };
        Router::new(RouterConfig::default(), collaborators).expect("router")
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let router = router().await;

        let (callback, outcome) = OneshotCallback::channel();
        router.send_request(
            RequestParams::new().with("amount", 10),
            42,
            Duration::from_secs(5),
            "billing.charge",
            "billing",
            callback,
        );
        let response = tokio::time::timeout(Duration::from_secs(10), outcome)
            .await
            .expect("outcome in time")
            .expect("callback kept")
            .expect("success");

        assert_eq!(response.request_id, 42);
        assert_eq!(response.body, json!({"status": 200, "echo": {"amount": 10}}));
        assert!(router.has_component("billing"));
        assert_eq!(router.stats().lookups_issued, 1);

        let (callback, outcome) = OneshotCallback::channel();
        router.send_request(
            RequestParams::new(),
            43,
            Duration::from_secs(5),
            "billing.balance",
            "billing",
            callback,
        );
        let response = tokio::time::timeout(Duration::from_secs(10), outcome)
            .await
            .expect("outcome in time")
            .expect("callback kept")
            .expect("success");
        assert_eq!(response.body["echo"], json!({}));
        assert_eq!(router.stats().lookups_issued, 1);
    }

    #[tokio::test]
    async fn test_unknown_component_rejected() {
        let router = router().await;

        let (callback, outcome) = OneshotCallback::channel();
        router.send_request(
            RequestParams::new(),
            7,
            Duration::from_secs(5),
            "missing.call",
            "missing",
            callback,
        );
        let failure = tokio::time::timeout(Duration::from_secs(10), outcome)
            .await
            .expect("outcome in time")
            .expect("callback kept")
            .expect_err("directory rejects");

        assert_eq!(failure.code, codes::SERVER_ERROR);
        assert_eq!(failure.message, "unknown component");
        assert!(!router.has_component("missing"));
    }
}
