//! Failsafe recovery web server.
//!
//! When the normal boot path cannot be trusted, this server gives a
//! browser on the local network everything needed to recover the device:
//! firmware upload and commit, raw flash read/write/restore, partition
//! backup downloads, environment management, a captured console, and a
//! reboot button, plus a one-lease DHCP responder so a directly attached
//! laptop gets an address without any setup.
//!
//! # Architecture
//!
//! ```text
//! net loop (one task)
//!   ├─ TcpListener ── RequestReader ── Router ── ResponseDriver
//!   │                                               │
//!   │                                    handlers ── ServerState
//!   │                                    (engine: NEW → RESPONDING* → CLOSED)
//!   └─ DhcpServer (DISCOVER→OFFER, REQUEST→ACK)
//! ```
//!
//! Wire parsing lives in `failsafe-http`, device and recovery logic in
//! `failsafe-core`; this crate owns sockets, routing, and the endpoint
//! handlers.

pub mod assets;
pub mod dhcp;
pub mod engine;
mod error;
pub mod handlers;
pub mod interp;
pub mod router;
pub mod server;
pub mod state;

pub use error::ServerError;
pub use server::{DhcpSetup, Server, ServerConfig};
pub use state::{ServerState, SessionOutcome, SystemControl};
