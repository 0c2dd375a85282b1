//! Client surface for the revolver peer-to-peer network.
//!
//! This crate exposes the narrow interface the FFI shim (`revolver-ffi`)
//! drives: a richly-typed [`Config`], and a [`Client`] created via
//! [`Client::new`] that offers address, identity, and counter snapshots
//! plus channel-backed [`Client::send`] / [`Client::recv`].
//!
//! Transport is an in-process switchboard keyed by network name: clients
//! on the same process that share a network name can dial each other by
//! multiaddress and exchange broadcast payloads. Discovery, gossip relay,
//! and NAT traversal are out of scope.

pub mod client;
pub mod config;
pub mod error;

mod logging;
mod switchboard;

pub use client::{Client, ShutdownFn};
pub use config::{Config, LogLevel, LogWriter};
pub use error::{Error, Result};

// Re-export the address type we speak at the API boundary.
pub use multiaddr::Multiaddr;
