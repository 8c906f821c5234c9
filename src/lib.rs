//! Mediaforge - streaming container inspection and MP4 remuxing
//!
//! This library crate exposes the CLI's building blocks for integration
//! testing.

pub mod config;
pub mod dump;
pub mod probe;
