//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the host application provides to the router.

use crate::domain::Endpoint;
use serde_json::Value;
use tokio::sync::mpsc;

/// Payload encryption applied to request parameters and response bodies.
pub trait PayloadCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// Cipher failure. Surfaces to the caller as a request-level error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cipher failure: {0}")]
pub struct CipherError(pub String);

/// Network reachability as seen by the host device.
pub trait Connectivity: Send + Sync {
    fn is_network_available(&self) -> bool;

    fn is_airplane_mode_on(&self) -> bool;
}

/// Work scheduled on the foreground execution context.
pub type ForegroundTask = Box<dyn FnOnce() + Send + 'static>;

/// The application's foreground (UI) execution context.
///
/// Callbacks for ordinary requests run here while a foreground surface is
/// active.
pub trait ForegroundDispatcher: Send + Sync {
    /// True while a foreground surface is active.
    fn has_foreground(&self) -> bool;

    /// Run `task` on the foreground context. Must not block on the task.
    fn run_on_foreground(&self, task: ForegroundTask);
}

/// Chooses the directory service node to contact.
pub trait DomainSelector: Send + Sync {
    /// A directory host, or `None` when none is known.
    fn select_domain(&self) -> Option<String>;

    /// Port of the directory service.
    fn port(&self) -> u16;
}

/// Opens physical connections to component endpoints.
///
/// `open` must return without waiting for the connection; progress is
/// reported through `events`, starting with [`TransportEvent::Connected`] or
/// one of the connect failures.
pub trait Transport: Send + Sync {
    fn open(
        &self,
        endpoint: &Endpoint,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportConnection>, TransportError>;
}

/// One open (or opening) physical connection.
pub trait TransportConnection: Send + Sync {
    /// Queue a JSON frame for transmission.
    fn emit(&self, frame: Value) -> Result<(), TransportError>;

    /// Close the connection. A [`TransportEvent::Disconnected`] follows.
    fn close(&self);
}

/// Events raised by a transport connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    Frame(Value),
    ConnectError(String),
    ConnectTimeout,
}

/// Errors from transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("connection closed")]
    Closed,

    #[error("send failed: {0}")]
    SendFailed(String),
}
