//! Handle registry: dense integer references to live clients.
//!
//! References are issued append-only under a write lock and are never
//! reused; a handle stays in the table for the process lifetime and is
//! only logically retired by shutdown. The registry is an ordinary
//! constructible object so tests can run against independent instances;
//! the FFI surface owns one process-global instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use revolver_p2p::{Client, ShutdownFn};

use crate::ffi::FfiResult;

/// One registered client and its one-shot release function.
pub struct Entry {
    client: Client,
    release: Mutex<Option<ShutdownFn>>,
    retired: AtomicBool,
}

impl Entry {
    /// The client, provided the handle has not been retired.
    pub(crate) fn live_client(&self) -> FfiResult<&Client> {
        if self.retired.load(Ordering::Acquire) {
            return Err("client already shut down".into());
        }
        Ok(&self.client)
    }

    /// Take and invoke the release function. The `Option` take is the
    /// idempotency guard: the second call fails without touching
    /// anything.
    pub(crate) fn retire(&self) -> FfiResult {
        let release = self.release.lock().expect("release lock").take();
        let Some(release) = release else {
            return Err("client already shut down".into());
        };
        self.retired.store(true, Ordering::Release);
        release();
        Ok(())
    }

    /// Whether shutdown has already run for this handle.
    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("client", &self.client)
            .field("retired", &self.retired)
            .finish_non_exhaustive()
    }
}

/// Append-only table mapping references to entries.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<Vec<Arc<Entry>>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and its release function. The new reference is
    /// the table size before the append, so references form the dense
    /// set {0..n-1} even under concurrent registration.
    pub(crate) fn register(&self, client: Client, release: ShutdownFn) -> i32 {
        let mut entries = self.entries.write().expect("registry lock");
        let reference = entries.len() as i32;
        entries.push(Arc::new(Entry {
            client,
            release: Mutex::new(Some(release)),
            retired: AtomicBool::new(false),
        }));
        reference
    }

    /// Look up a reference. An out-of-range or negative reference is an
    /// error, not a crash.
    pub(crate) fn get(&self, reference: i32) -> FfiResult<Arc<Entry>> {
        usize::try_from(reference)
            .ok()
            .and_then(|idx| self.entries.read().expect("registry lock").get(idx).cloned())
            .ok_or_else(|| format!("invalid client reference {reference}").into())
    }

    /// Number of references issued so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock").len()
    }

    /// Whether no reference was issued yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The process-global registry behind the `p2p_*` surface.
pub(crate) fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}
