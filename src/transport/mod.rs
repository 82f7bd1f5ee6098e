//! Transport module - whole-frame I/O over a connected byte stream.
//!
//! Provides:
//! - TCP connection to the CPX bridge (the AI-deck's WiFi side)
//! - Exact-length reads with an optional timeout
//! - Request/response transactions on a single-owner handle

mod config;
mod stream;

pub use config::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_PORT};
pub use stream::{Transport, DEFAULT_READ_TIMEOUT};
