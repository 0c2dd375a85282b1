//! Unified error types for the revolver client surface.

use multiaddr::Multiaddr;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the revolver client surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Opening or writing the configured log file failed.
    #[error("log file: {0}")]
    LogFile(#[source] std::io::Error),

    /// The bind IP did not form a valid listen multiaddress.
    #[error("bind ip {0:?} is not a valid IPv4 address")]
    BindAddress(String),

    /// A duration field carried a negative second count.
    #[error("negative duration for {0}")]
    NegativeDuration(&'static str),

    /// Another client already listens on this address in the same network.
    #[error("address in use: {0}")]
    AddressInUse(Multiaddr),

    /// The client was shut down; its channels no longer move data.
    #[error("client shut down")]
    Shutdown,
}
