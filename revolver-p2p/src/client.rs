//! The client: identity, counters, and the send/receive channels.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use multiaddr::Multiaddr;
use sha3::{Digest, Sha3_256};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging;
use crate::switchboard::{self, Endpoint};

/// Releases every resource tied to a client: marks it dead, drops its
/// switchboard slot, and stops its forwarder task.
pub type ShutdownFn = Box<dyn FnOnce() + Send + 'static>;

/// One participant in a revolver network.
///
/// Created by [`Client::new`] together with its [`ShutdownFn`]. All
/// methods take `&self`; [`Client::send`] and [`Client::recv`] suspend on
/// the outbound/inbound channels.
pub struct Client {
    id: String,
    addresses: Vec<Multiaddr>,
    endpoint: Arc<Endpoint>,
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl Client {
    /// Join `cfg.network`, dial the configured seed nodes, and start the
    /// broadcast forwarder.
    ///
    /// The first client in the process installs the global `tracing`
    /// subscriber from its log settings; later clients inherit it.
    ///
    /// # Errors
    /// Fails when the bind IP does not form a valid listen multiaddress
    /// or the listen address is already taken in this network.
    /// A seed node that is not reachable on the switchboard is logged and
    /// skipped; finding it again is peer discovery's job, which lives
    /// outside this crate.
    pub async fn new(cfg: Config) -> Result<(Self, ShutdownFn)> {
        logging::init(cfg.log_level, &cfg.log_writer);

        let id = identity(&cfg.random_seed);
        let addr = cfg.listen_addr()?;

        let (inbox_tx, inbox_rx) = mpsc::channel(cfg.ping_buffer_size.max(1) as usize);
        let endpoint = Arc::new(Endpoint {
            id: id.clone(),
            inbox: inbox_tx,
            alive: Arc::new(AtomicBool::new(true)),
            links: Mutex::new(HashMap::new()),
        });

        switchboard::join(&cfg.network, addr.as_ref(), &endpoint)?;

        for seed in &cfg.seed_nodes {
            if switchboard::dial(&cfg.network, seed, &endpoint) {
                tracing::debug!(id = %id, seed = %seed, "connected to seed node");
            } else {
                tracing::warn!(id = %id, seed = %seed, "seed node not reachable, skipping");
            }
        }

        let (outbound, out_rx) = mpsc::channel(cfg.streamstore_queue_size.max(1));
        let forwarder = tokio::spawn(forward(
            out_rx,
            Arc::clone(&endpoint),
            cfg.disable_broadcast,
        ));

        let client = Self {
            id: id.clone(),
            addresses: addr.clone().into_iter().collect(),
            endpoint: Arc::clone(&endpoint),
            outbound,
            inbound: tokio::sync::Mutex::new(inbox_rx),
        };

        let network = cfg.network.clone();
        let alive = Arc::clone(&endpoint.alive);
        let shutdown: ShutdownFn = Box::new(move || {
            alive.store(false, Ordering::Release);
            switchboard::leave(&network, addr.as_ref());
            forwarder.abort();
            tracing::info!(id = %id, "client shut down");
        });

        tracing::info!(
            id = %client.id,
            network = %cfg.network,
            addresses = ?client.addresses.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "client online"
        );
        Ok((client, shutdown))
    }

    /// The client identifier, stable for the client's lifetime.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The client's current listen addresses, in order.
    #[must_use]
    pub fn addresses(&self) -> Vec<Multiaddr> {
        self.addresses.clone()
    }

    /// Snapshot of the number of live peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.endpoint.peer_count()
    }

    /// Snapshot of the number of open streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.endpoint.stream_count()
    }

    /// Submit one payload for broadcast. Suspends until the outbound
    /// channel accepts it; this is the backpressure point.
    ///
    /// # Errors
    /// Returns [`Error::Shutdown`] once the client has been shut down.
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        // The alive check makes send-after-shutdown deterministic; the
        // forwarder's receiver is dropped asynchronously after abort.
        if !self.endpoint.alive.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        self.outbound.send(payload).await.map_err(|_| Error::Shutdown)
    }

    /// Take exactly one inbound payload, suspending until one arrives.
    /// Returns `None` once the inbound channel can yield nothing more.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        self.inbound.lock().await.recv().await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}

/// Fan each outbound payload out to every live peer.
async fn forward(
    mut out_rx: mpsc::Receiver<Vec<u8>>,
    endpoint: Arc<Endpoint>,
    disable_broadcast: bool,
) {
    while let Some(payload) = out_rx.recv().await {
        if disable_broadcast || !endpoint.alive.load(Ordering::Acquire) {
            continue;
        }
        let targets: Vec<mpsc::Sender<Vec<u8>>> = endpoint
            .links
            .lock()
            .expect("endpoint links lock")
            .values()
            .filter(|l| l.alive.load(Ordering::Acquire))
            .map(|l| l.inbox.clone())
            .collect();
        for target in targets {
            // A peer that went away mid-send is dropped silently.
            let _ = target.send(payload.clone()).await;
        }
    }
}

/// Derive the client identifier: SHA3-256 of the configured seed, or of
/// fresh OS entropy when no seed is given.
fn identity(seed: &str) -> String {
    let mut hasher = Sha3_256::new();
    if seed.is_empty() {
        let mut entropy = [0u8; 32];
        getrandom::fill(&mut entropy).expect("os entropy");
        hasher.update(entropy);
    } else {
        hasher.update(seed.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_deterministic_for_a_seed() {
        assert_eq!(identity("alpha"), identity("alpha"));
        assert_ne!(identity("alpha"), identity("beta"));
        assert_eq!(identity("alpha").len(), 64);
    }

    #[test]
    fn identity_without_seed_is_random() {
        assert_ne!(identity(""), identity(""));
    }
}
