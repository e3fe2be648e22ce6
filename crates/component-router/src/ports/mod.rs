//! # Ports Layer
//!
//! - **Driving Ports (Inbound):** callbacks the router invokes on callers
//! - **Driven Ports (Outbound):** services the host provides to the router

pub mod inbound;
pub mod outbound;

use std::sync::Arc;

pub use inbound::ResponseCallback;
pub use outbound::{
    CipherError, Connectivity, DomainSelector, ForegroundDispatcher, ForegroundTask,
    PayloadCipher, Transport, TransportConnection, TransportError, TransportEvent,
};

/// Host services a [`Router`](crate::Router) is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub cipher: Arc<dyn PayloadCipher>,
    pub connectivity: Arc<dyn Connectivity>,
    pub foreground: Arc<dyn ForegroundDispatcher>,
    pub domains: Arc<dyn DomainSelector>,
}
