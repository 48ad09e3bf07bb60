//! Embedded, log-structured key-value store with a composite-key
//! encoding layer exposing five Redis-like data types. The `server` crate
//! wraps this with a RESP front-end.

pub mod batch;
pub mod cache;
pub mod db;
pub mod engine;
pub mod error;
pub mod filter;
pub mod index;
pub mod log_manager;
pub mod options;
pub mod record;
pub mod ttl;
pub mod types;

pub use db::Database;
pub use engine::Engine;
pub use error::{Error, Result};
pub use options::{DbOptions, MemIndexKind, Options};
