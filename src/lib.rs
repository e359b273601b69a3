//! # TC-08 Relay
//!
//! Bridges a remote controller and a Pico USB TC-08 thermocouple data logger over a
//! WebSocket. The controller sends JSON commands (open the instrument, configure
//! channels, start or stop streaming, read every channel) and receives one JSON
//! snapshot per read request.
//!
//! ## Crate Structure
//!
//! - **`driver`**: the [`driver::Tc08Driver`] trait mirroring the vendor C API, a
//!   scriptable [`driver::MockDriver`], and the FFI-backed driver behind the
//!   `hardware` feature.
//! - **`device`**: [`device::DeviceController`], which owns the instrument handle and
//!   the channel table and turns driver status codes into typed errors.
//! - **`protocol`**: inbound command envelopes and the outbound snapshot encoding.
//! - **`session`**: [`session::CommandSession`], one connection driving one
//!   instrument, with guaranteed close on every exit path.
//! - **`server`**: the TCP/WebSocket listener admitting one session at a time.
//! - **`config`**: Figment-based configuration (`config/relay.toml` + environment).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: [`error::RelayError`] and the vendor error table.

pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;

pub use error::{RelayError, Result};
