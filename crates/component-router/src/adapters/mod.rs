//! # Adapters Layer
//!
//! Concrete implementations of the outbound ports, usable by hosts that
//! have no platform-specific equivalent.

pub mod callback;
pub mod cipher;
pub mod connectivity;
pub mod domains;
pub mod foreground;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use callback::OneshotCallback;
pub use cipher::PlaintextCipher;
pub use connectivity::StaticConnectivity;
pub use domains::DirectoryDomains;
pub use foreground::{ForegroundLoop, Headless};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
