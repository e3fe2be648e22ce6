//! # Component Router Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks (lookup ids, wire codec)
//! └── src/integration/  # Cross-module scenarios
//!     ├── scenarios.rs  # Router, managers and channels over a scripted transport
//!     └── websocket.rs  # Real WebSocket round trips against a local server
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p router-tests
//! cargo test -p router-tests integration::websocket::
//! cargo bench -p router-tests
//! ```

#![allow(dead_code)]

pub mod integration;
