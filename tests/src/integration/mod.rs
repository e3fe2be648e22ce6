//! Cross-module integration scenarios.

pub mod scenarios;
pub mod websocket;
