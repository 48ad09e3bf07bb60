//! RESP wire adapter and command dispatch (C10) for the `fincas` storage
//! engine. Split into a library (this crate) plus a thin `main.rs` binary
//! so integration tests can dispatch commands directly without going
//! through a live TCP socket.

pub mod config;
pub mod conn;
pub mod dispatch;
pub mod resp;
