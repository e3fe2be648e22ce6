//! # Component Router
//!
//! Client-side routing of JSON requests to named server components.
//!
//! A caller addresses a request to a component by name. The router resolves
//! the component's endpoint through a directory service (itself reached as
//! the reserved component `ds`), keeps one persistent connection per
//! component, correlates responses to callbacks by request id, enforces
//! per-request timeouts and delivers every outcome exactly once, on the
//! foreground context when one is active.
//!
//! ## Architecture
//!
//! - **Domain Layer:** requests, addresses, directory protocol, error codes
//! - **Ports Layer:** callback and host-service traits
//! - **Channel:** one physical connection with wire codec and deadlines
//! - **Manager:** one component's connection lifecycle and request buffer
//! - **Router:** lookup orchestration and manager registry
//! - **Adapters Layer:** concrete host services (feature-gated WebSocket)
//!
//! Upward notification (channel to manager, manager to router) flows only
//! through unbounded queues, and callbacks never run while a lock is held.
//!
//! ## Example
//!
//! ```rust,no_run
//! use component_router::adapters::{
//!     DirectoryDomains, Headless, OneshotCallback, PlaintextCipher, StaticConnectivity,
//!     WebSocketTransport,
//! };
//! use component_router::{Collaborators, RequestParams, Router, RouterConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RouterConfig::default().with_directory_domains(["ds.example.net"]);
//! let collaborators = Collaborators {
//!     transport: Arc::new(WebSocketTransport::new(
//!         config.connect_timeout,
//!         tokio::runtime::Handle::current(),
//!     )),
//!     cipher: Arc::new(PlaintextCipher),
//!     connectivity: Arc::new(StaticConnectivity::online()),
//!     foreground: Arc::new(Headless),
//!     domains: Arc::new(DirectoryDomains::from_config(&config.directory)),
//! };
//! let router = Router::new(config, collaborators)?;
//!
//! let (callback, outcome) = OneshotCallback::channel();
//! let params = RequestParams::new().with("amount", 10);
//! router.send_request(params, 42, Duration::from_secs(30), "billing.charge", "billing", callback);
//! let response = outcome.await??;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod adapters;
pub mod channel;
pub mod domain;
pub(crate) mod manager;
pub mod ports;
pub mod router;

// =============================================================================
// TEST UTILITIES (Requires `test-utils` feature)
// =============================================================================

/// Scripted transport, recording callbacks and a wired router harness.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use channel::ChannelStatus;
pub use domain::{
    codes, ComponentAddress, ConfigError, DirectoryConfig, Endpoint, ErrorMessages,
    RequestFailure, RequestId, RequestParams, Response, RouterConfig, RouterError,
};
pub use ports::{
    Collaborators, Connectivity, DomainSelector, ForegroundDispatcher, PayloadCipher,
    ResponseCallback, Transport, TransportConnection, TransportEvent,
};
pub use router::stats::StatsSnapshot;
pub use router::Router;
