//! Canonical registry: one converging view per firewalled peer.
//!
//! Query replies, pongs, download headers and DHT lookups each produce their
//! own [`EndpointState`] for a peer. None of them is authoritative. The
//! registry folds them into a single canonical entry per GUID so that every
//! live handle for that peer reads the same proxies and features.
//!
//! Locking: the map is sharded ([`DashMap`]); each entry carries its own
//! mutex. A shard guard is always released before an entry lock is taken, so
//! updates for different peers run in parallel and the only place both are
//! held (shard, then entry) is eviction and `clear`.
//!
//! Lifetime is explicit. A [`CanonicalHandle`] is an interest in its entry;
//! an entry nobody holds is dropped by [`EndpointRegistry::sweep`] once it
//! has been idle for the grace window. An entry somebody holds never leaves
//! the map, so a handle and the map always agree on which entry is canonical.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use pushpoint_core::config::RegistryConfig;
use pushpoint_core::endpoint::{is_placeholder, MAX_FWT_VERSION};
use pushpoint_core::http::{decode_proxy_list, PROXY_LIST_SEPARATOR};
use pushpoint_core::{ClientGuid, EndpointState, Features, ProxySet};

// ── Canonical entry ───────────────────────────────────────────────────────────

/// Registry-held description of one peer.
pub struct CanonicalEntry {
    guid: ClientGuid,
    state: Mutex<CanonicalState>,
}

struct CanonicalState {
    proxies: ProxySet,
    features: Features,
    external_addr: Option<SocketAddrV4>,
    /// Last resolve or update. Drives idle eviction.
    touched: Instant,
}

impl CanonicalState {
    fn seeded(candidate: &EndpointState, valid: bool) -> Self {
        Self {
            proxies: if valid {
                candidate.proxies().clone()
            } else {
                ProxySet::new()
            },
            features: candidate.features(),
            external_addr: candidate.external_addr(),
            touched: Instant::now(),
        }
    }

    fn empty() -> Self {
        Self {
            proxies: ProxySet::new(),
            features: Features::default(),
            external_addr: None,
            touched: Instant::now(),
        }
    }
}

impl CanonicalEntry {
    fn new(guid: ClientGuid, state: CanonicalState) -> Self {
        Self {
            guid,
            state: Mutex::new(state),
        }
    }

    /// All fields as of one point in the update sequence.
    fn snapshot(&self) -> EndpointState {
        let mut state = self.state.lock();
        state.touched = Instant::now();
        EndpointState::new(
            self.guid,
            state.proxies.clone(),
            state.features,
            state.external_addr,
        )
    }

    fn update(&self, apply: impl FnOnce(&mut CanonicalState)) {
        let mut state = self.state.lock();
        apply(&mut state);
        state.touched = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state.lock().touched)
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// An interest in a canonical entry.
///
/// While any handle for a GUID is alive its entry is never evicted. Dropping
/// the last one makes the entry eligible once it has been idle for the grace
/// window. Equality and hashing use the GUID only.
#[derive(Clone)]
pub struct CanonicalHandle {
    entry: Arc<CanonicalEntry>,
}

impl CanonicalHandle {
    pub fn guid(&self) -> ClientGuid {
        self.entry.guid
    }

    /// Current canonical state.
    pub fn resolve(&self) -> EndpointState {
        self.entry.snapshot()
    }
}

impl PartialEq for CanonicalHandle {
    fn eq(&self, other: &Self) -> bool {
        self.entry.guid == other.entry.guid
    }
}

impl Eq for CanonicalHandle {}

impl Hash for CanonicalHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entry.guid.hash(state);
    }
}

impl fmt::Debug for CanonicalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalHandle")
            .field("guid", &self.entry.guid)
            .finish()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Bookkeeping for sweeps triggered by inserts over capacity.
///
/// When most entries are held a sweep frees little, so the next one waits
/// until the map has doubled from what the last sweep left behind. Inserts
/// then pay amortized constant work however many handles are alive.
#[derive(Default)]
struct OverflowState {
    /// Map size that triggers the next sweep.
    threshold: AtomicUsize,
    in_progress: AtomicBool,
    sweeps: AtomicUsize,
}

/// Process-wide canonical push-endpoint store. Cheap to clone; clones share
/// the same map.
#[derive(Clone)]
pub struct EndpointRegistry {
    entries: Arc<DashMap<ClientGuid, Arc<CanonicalEntry>>>,
    max_entries: usize,
    idle_grace: Duration,
    overflow: Arc<OverflowState>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl EndpointRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        let max_entries = config.max_entries.max(1);
        let overflow = OverflowState::default();
        overflow.threshold.store(max_entries, Ordering::Relaxed);
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries,
            idle_grace: config.idle_grace(),
            overflow: Arc::new(overflow),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch or atomically create the entry for `guid`.
    ///
    /// Returns the entry and whether this call created it. The shard guard is
    /// gone by the time this returns.
    fn entry_or_insert(
        &self,
        guid: ClientGuid,
        seed: impl FnOnce() -> CanonicalState,
    ) -> (Arc<CanonicalEntry>, bool) {
        let mut created = false;
        let entry = self
            .entries
            .entry(guid)
            .or_insert_with(|| {
                created = true;
                Arc::new(CanonicalEntry::new(guid, seed()))
            })
            .clone();

        if created && self.entries.len() > self.overflow.threshold.load(Ordering::Relaxed) {
            self.sweep_overflow();
        }
        (entry, created)
    }

    /// Drop idle entries right away after an insert crossed the threshold.
    /// Concurrent inserts that also crossed it skip rather than queue up.
    fn sweep_overflow(&self) {
        if self.overflow.in_progress.swap(true, Ordering::Acquire) {
            return;
        }
        let evicted = self.evict_idle(Duration::ZERO);
        self.overflow.sweeps.fetch_add(1, Ordering::Relaxed);
        self.overflow.in_progress.store(false, Ordering::Release);
        tracing::debug!(
            evicted,
            remaining = self.entries.len(),
            max_entries = self.max_entries,
            next_sweep_at = self.overflow.threshold.load(Ordering::Relaxed),
            "registry over capacity"
        );
    }

    fn existing(&self, guid: &ClientGuid) -> Option<Arc<CanonicalEntry>> {
        self.entries.get(guid).map(|e| e.value().clone())
    }

    /// Current canonical knowledge about `guid`, if any.
    pub fn resolve(&self, guid: &ClientGuid) -> Option<EndpointState> {
        self.existing(guid).map(|entry| entry.snapshot())
    }

    /// Merge `candidate`'s proxies into the canonical entry for its GUID:
    /// union when `valid`, difference otherwise.
    ///
    /// The first update for a GUID creates the entry, seeded with the
    /// candidate's features and external address (and its proxies, if
    /// valid). Later updates touch the proxy set only.
    pub fn update_proxies(&self, candidate: &EndpointState, valid: bool) -> CanonicalHandle {
        let guid = candidate.guid();
        let (entry, created) =
            self.entry_or_insert(guid, || CanonicalState::seeded(candidate, valid));

        if !created {
            entry.update(|state| {
                if valid {
                    state.proxies.extend_from(candidate.proxies());
                } else {
                    state.proxies.remove_all(candidate.proxies());
                }
            });
        }

        tracing::debug!(
            guid = %guid,
            valid,
            created,
            proxies = candidate.proxies().len(),
            "updated push proxies"
        );

        CanonicalHandle { entry }
    }

    /// Replace the external address. Last write wins.
    pub fn set_external_addr(&self, guid: ClientGuid, addr: Option<SocketAddrV4>) {
        let addr = match addr {
            Some(a) if is_placeholder(&a) => {
                tracing::warn!(guid = %guid, addr = %a, "placeholder given as external address");
                None
            }
            other => other,
        };
        let (entry, _) = self.entry_or_insert(guid, CanonicalState::empty);
        entry.update(|state| state.external_addr = addr);
    }

    /// Replace the firewall-to-firewall version. Last write wins.
    pub fn set_fwt_version(&self, guid: ClientGuid, version: u8) {
        let (entry, _) = self.entry_or_insert(guid, CanonicalState::empty);
        entry.update(|state| state.features.fwt_version = version.min(MAX_FWT_VERSION));
    }

    /// Drop one proxy, leaving the rest. Returns whether it was present.
    pub fn remove_proxy(&self, guid: &ClientGuid, proxy: &SocketAddrV4) -> bool {
        let Some(entry) = self.existing(guid) else {
            return false;
        };
        let mut removed = false;
        entry.update(|state| removed = state.proxies.remove(proxy));
        if removed {
            tracing::debug!(guid = %guid, proxy = %proxy, "removed push proxy");
        }
        removed
    }

    /// Replace the whole proxy set, for sources that know the full answer.
    pub fn overwrite_proxies(&self, guid: ClientGuid, proxies: ProxySet) {
        let (entry, created) = self.entry_or_insert(guid, CanonicalState::empty);
        tracing::debug!(guid = %guid, created, proxies = proxies.len(), "overwriting push proxies");
        entry.update(|state| state.proxies = proxies);
    }

    /// [`overwrite_proxies`](Self::overwrite_proxies) from an
    /// `X-Push-Proxies` style value.
    pub fn overwrite_proxies_from_header(&self, guid: ClientGuid, value: &str) {
        self.overwrite_proxies(guid, decode_proxy_list(value, PROXY_LIST_SEPARATOR));
    }

    /// Express interest in an existing entry without changing it.
    pub fn register_interest(&self, guid: &ClientGuid) -> Option<CanonicalHandle> {
        self.existing(guid).map(|entry| CanonicalHandle { entry })
    }

    /// Number of live handles on `guid`'s entry.
    pub fn interest(&self, guid: &ClientGuid) -> usize {
        self.entries
            .get(guid)
            .map(|e| Arc::strong_count(e.value()) - 1)
            .unwrap_or(0)
    }

    /// Forget everything known. Entries nobody holds are dropped; held
    /// entries stay in place with their proxies, features and external
    /// address reset, so live handles keep tracking the map.
    pub fn clear(&self) {
        self.entries.retain(|_, entry| {
            if Arc::strong_count(entry) > 1 {
                entry.update(|state| *state = CanonicalState::empty());
                true
            } else {
                false
            }
        });
        self.reset_overflow_threshold();
    }

    /// Evict unreferenced entries idle for at least the configured grace.
    pub fn sweep(&self) -> usize {
        self.evict_idle(self.idle_grace)
    }

    /// Evict unreferenced entries idle for at least `grace`.
    ///
    /// Runs under each shard's write lock, so nobody can be halfway through
    /// taking a handle on an entry as it goes.
    pub fn evict_idle(&self, grace: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            let keep = Arc::strong_count(entry) > 1 || entry.idle_for(now) < grace;
            if !keep {
                evicted += 1;
            }
            keep
        });
        self.reset_overflow_threshold();
        evicted
    }

    fn reset_overflow_threshold(&self) {
        let survivors = self.entries.len();
        self.overflow
            .threshold
            .store(self.max_entries.max(survivors.saturating_mul(2)), Ordering::Relaxed);
    }
}
