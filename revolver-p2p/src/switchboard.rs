//! In-process switchboard: the transport behind [`crate::Client`].
//!
//! One board per process, keyed by network name, mapping listen
//! multiaddresses to endpoints. Dialing wires two endpoints together by
//! exchanging inbox senders; delivery is a bounded-channel send. Links to
//! a departed endpoint stay in peers' maps but are filtered out by the
//! `alive` flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use multiaddr::Multiaddr;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// One directed link to a peer's inbox.
pub(crate) struct Link {
    pub inbox: mpsc::Sender<Vec<u8>>,
    pub alive: Arc<AtomicBool>,
}

/// A client's presence on the board. Shared with the board and with every
/// peer that dialed it.
pub(crate) struct Endpoint {
    pub id: String,
    pub inbox: mpsc::Sender<Vec<u8>>,
    pub alive: Arc<AtomicBool>,
    /// Links keyed by peer identifier.
    pub links: Mutex<HashMap<String, Link>>,
}

impl Endpoint {
    /// Count of links whose peer is still alive.
    pub fn peer_count(&self) -> usize {
        self.links
            .lock()
            .expect("endpoint links lock")
            .values()
            .filter(|l| l.alive.load(Ordering::Acquire))
            .count()
    }

    /// Count of links that can still accept a payload.
    pub fn stream_count(&self) -> usize {
        self.links
            .lock()
            .expect("endpoint links lock")
            .values()
            .filter(|l| l.alive.load(Ordering::Acquire) && !l.inbox.is_closed())
            .count()
    }
}

type Board = Mutex<HashMap<String, HashMap<Multiaddr, Arc<Endpoint>>>>;

fn board() -> &'static Board {
    static BOARD: OnceLock<Board> = OnceLock::new();
    BOARD.get_or_init(Board::default)
}

/// Register an endpoint under its listen address. An address-less
/// endpoint joins nothing and simply cannot be dialed.
pub(crate) fn join(network: &str, addr: Option<&Multiaddr>, endpoint: &Arc<Endpoint>) -> Result<()> {
    let Some(addr) = addr else { return Ok(()) };
    let mut board = board().lock().expect("switchboard lock");
    let slots = board.entry(network.to_owned()).or_default();
    if let Some(present) = slots.get(addr) {
        if present.alive.load(Ordering::Acquire) {
            return Err(Error::AddressInUse(addr.clone()));
        }
    }
    slots.insert(addr.clone(), Arc::clone(endpoint));
    Ok(())
}

/// Wire `dialer` to whichever endpoint listens on `addr`, both ways.
/// Returns false when nothing (live) listens there or the address is the
/// dialer's own.
pub(crate) fn dial(network: &str, addr: &Multiaddr, dialer: &Arc<Endpoint>) -> bool {
    let peer = {
        let board = board().lock().expect("switchboard lock");
        match board.get(network).and_then(|slots| slots.get(addr)) {
            Some(p) if p.alive.load(Ordering::Acquire) && p.id != dialer.id => Arc::clone(p),
            _ => return false,
        }
    };
    dialer.links.lock().expect("endpoint links lock").insert(
        peer.id.clone(),
        Link {
            inbox: peer.inbox.clone(),
            alive: Arc::clone(&peer.alive),
        },
    );
    peer.links.lock().expect("endpoint links lock").insert(
        dialer.id.clone(),
        Link {
            inbox: dialer.inbox.clone(),
            alive: Arc::clone(&dialer.alive),
        },
    );
    true
}

/// Drop an endpoint's slot. The caller clears the `alive` flag first so
/// stale links held by peers stop counting.
pub(crate) fn leave(network: &str, addr: Option<&Multiaddr>) {
    let Some(addr) = addr else { return };
    let mut board = board().lock().expect("switchboard lock");
    if let Some(slots) = board.get_mut(network) {
        slots.remove(addr);
        if slots.is_empty() {
            board.remove(network);
        }
    }
}
