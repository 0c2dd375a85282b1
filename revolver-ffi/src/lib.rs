//! `revolver-ffi` — C ABI stable bindings for driving a revolver p2p
//! client from foreign hosts.
//!
//! Design principles:
//! - Every fallible function returns `i32` (0 = ok, -1 = error) unless it
//!   returns a primitive snapshot (`-1` = error) or a pointer (null = error).
//! - Errors are stored in a thread-local string, retrieved via
//!   [`p2p_last_error_message`]. Nothing in this crate aborts the host.
//! - Clients are addressed by small integer references issued by a
//!   process-wide registry; references are dense and never reused.
//! - Payload-bearing results cross the boundary as callee-allocated
//!   [`P2pMessage`] buffers, freed by the caller via [`p2p_free_message`].
//! - Blocking operations (`p2p_send`, `p2p_receive`) run the client's
//!   async channels to completion on a shared tokio runtime.
//!
//! The matching C header lives at `include/revolver.h`.
//!
//! [`p2p_last_error_message`]: ffi::p2p_last_error_message
//! [`P2pMessage`]: ffi::P2pMessage
//! [`p2p_free_message`]: ffi::p2p_free_message

#![allow(unsafe_code)]

mod ffi;

pub mod client;
pub mod config;
pub mod registry;

// Re-export key items so every module can use them without `crate::ffi::` prefix.
#[allow(unused_imports)]
pub(crate) use ffi::*;
