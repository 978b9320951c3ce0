//! Recovery-domain logic for the failsafe web server.
//!
//! Everything here is sans-IO with respect to the network: the storage
//! facade over flash and block backends, the persisted key/value
//! environment, the console capture ring, the one-shot upload slot, image
//! validation/commit, and backup filename handling. The server crate wires
//! these to HTTP endpoints; this crate never sees a socket.

pub mod backup;
pub mod board;
pub mod console;
pub mod env;
pub mod image;
pub mod layout;
pub mod storage;
pub mod upload;
