//! Loopcast - endless live HLS from a finite source
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod server;
pub mod streaming;
