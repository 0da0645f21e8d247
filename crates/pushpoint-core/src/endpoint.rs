//! Endpoint values: a point-in-time description of a firewalled peer.
//!
//! An [`EndpointState`] is what the codecs produce and consume and what the
//! canonical registry stores. It is plain data: cloning it detaches it from
//! whatever registry entry it was read from.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::guid::ClientGuid;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Most proxies ever written by an encoder.
pub const MAX_PROXIES: usize = 4;

/// Most proxies accepted by a decoder. The binary header has three bits
/// for the count, so peers may legally announce up to seven.
pub const MAX_DECODED_PROXIES: usize = 7;

/// Highest firewall-to-firewall version the header can carry (two bits).
pub const MAX_FWT_VERSION: u8 = 3;

/// Placeholder address written when a peer's external address is unknown.
/// Never a valid external address.
pub const BOGUS_IP: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);

/// Port written alongside [`BOGUS_IP`].
pub const DEFAULT_PORT: u16 = 6346;

/// True if `addr` is the unknown-address placeholder, whatever its port.
pub fn is_placeholder(addr: &SocketAddrV4) -> bool {
    *addr.ip() == BOGUS_IP
}

// ── Push proxy ────────────────────────────────────────────────────────────────

/// A relay host that forwards push requests to a firewalled peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushProxy {
    pub addr: SocketAddrV4,
    /// The proxy accepts TLS connections.
    pub tls: bool,
}

impl PushProxy {
    pub fn new(addr: SocketAddrV4, tls: bool) -> Self {
        Self { addr, tls }
    }

    pub fn plain(addr: SocketAddrV4) -> Self {
        Self { addr, tls: false }
    }
}

impl fmt::Display for PushProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tls {
            write!(f, "{} (tls)", self.addr)
        } else {
            write!(f, "{}", self.addr)
        }
    }
}

// ── Proxy set ─────────────────────────────────────────────────────────────────

/// Set of push proxies keyed by address.
///
/// Membership is decided by (ip, port) alone; the TLS flag rides along as an
/// attribute. Iteration order is ascending by address and is the order every
/// encoder writes proxies and assigns TLS bits in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySet {
    proxies: BTreeMap<SocketAddrV4, bool>,
}

impl ProxySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddrV4) -> bool {
        self.proxies.contains_key(addr)
    }

    /// TLS flag of a member proxy.
    pub fn tls(&self, addr: &SocketAddrV4) -> Option<bool> {
        self.proxies.get(addr).copied()
    }

    /// Add a proxy. Adding an address that is already present is a no-op and
    /// returns false.
    pub fn insert(&mut self, proxy: PushProxy) -> bool {
        match self.proxies.entry(proxy.addr) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(proxy.tls);
                true
            }
        }
    }

    pub fn remove(&mut self, addr: &SocketAddrV4) -> bool {
        self.proxies.remove(addr).is_some()
    }

    /// Union in place.
    pub fn extend_from(&mut self, other: &ProxySet) {
        for proxy in other.iter() {
            self.insert(proxy);
        }
    }

    /// Difference in place.
    pub fn remove_all(&mut self, other: &ProxySet) {
        for addr in other.proxies.keys() {
            self.proxies.remove(addr);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = PushProxy> + '_ {
        self.proxies
            .iter()
            .map(|(addr, tls)| PushProxy::new(*addr, *tls))
    }

    /// The proxies an encoder writes, in wire order.
    pub fn encodable(&self) -> impl Iterator<Item = PushProxy> + '_ {
        self.iter().take(MAX_PROXIES)
    }
}

impl FromIterator<PushProxy> for ProxySet {
    fn from_iter<I: IntoIterator<Item = PushProxy>>(iter: I) -> Self {
        let mut set = ProxySet::new();
        for proxy in iter {
            set.insert(proxy);
        }
        set
    }
}

impl Extend<PushProxy> for ProxySet {
    fn extend<I: IntoIterator<Item = PushProxy>>(&mut self, iter: I) {
        for proxy in iter {
            self.insert(proxy);
        }
    }
}

// ── Features ──────────────────────────────────────────────────────────────────

/// Feature bits advertised by a push endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Features {
    /// Firewall-to-firewall transfer version. 0 = unsupported.
    pub fwt_version: u8,
    /// Reserved extension bits (header bits 5-6, shifted down). Carried
    /// verbatim even though nothing interprets them yet.
    pub reserved: u8,
}

impl Features {
    pub fn with_fwt(fwt_version: u8) -> Self {
        Self {
            fwt_version: fwt_version.min(MAX_FWT_VERSION),
            reserved: 0,
        }
    }

    pub fn supports_fwt(&self) -> bool {
        self.fwt_version > 0
    }
}

// ── Endpoint state ────────────────────────────────────────────────────────────

/// Everything known about one firewalled peer at a point in time.
///
/// Equality and hashing consider only the GUID: two states for the same
/// peer are interchangeable as keys regardless of their proxies or features.
#[derive(Debug, Clone)]
pub struct EndpointState {
    guid: ClientGuid,
    proxies: ProxySet,
    features: Features,
    external_addr: Option<SocketAddrV4>,
}

impl EndpointState {
    /// Build a state. A placeholder external address is a caller defect:
    /// it is logged and dropped rather than stored.
    pub fn new(
        guid: ClientGuid,
        proxies: ProxySet,
        features: Features,
        external_addr: Option<SocketAddrV4>,
    ) -> Self {
        let external_addr = match external_addr {
            Some(addr) if is_placeholder(&addr) => {
                tracing::warn!(guid = %guid, addr = %addr, "placeholder given as external address");
                None
            }
            other => other,
        };
        Self {
            guid,
            proxies,
            features: Features {
                fwt_version: features.fwt_version.min(MAX_FWT_VERSION),
                reserved: features.reserved & 0b11,
            },
            external_addr,
        }
    }

    /// A known peer with no proxies and no features.
    pub fn bare(guid: ClientGuid) -> Self {
        Self::new(guid, ProxySet::new(), Features::default(), None)
    }

    pub fn guid(&self) -> ClientGuid {
        self.guid
    }

    pub fn proxies(&self) -> &ProxySet {
        &self.proxies
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn fwt_version(&self) -> u8 {
        self.features.fwt_version
    }

    pub fn supports_fwt(&self) -> bool {
        self.features.supports_fwt()
    }

    /// External address; only reported while the peer supports FWT.
    pub fn external_addr(&self) -> Option<SocketAddrV4> {
        if self.supports_fwt() {
            self.external_addr
        } else {
            None
        }
    }

    /// Field-by-field comparison, unlike `==` which only compares GUIDs.
    pub fn same_fields(&self, other: &EndpointState) -> bool {
        self.guid == other.guid
            && self.proxies == other.proxies
            && self.features == other.features
            && self.external_addr() == other.external_addr()
    }
}

impl PartialEq for EndpointState {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for EndpointState {}

impl Hash for EndpointState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.guid.hash(state);
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fwt={} proxies=[", self.guid, self.fwt_version())?;
        for (i, proxy) in self.proxies.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{proxy}")?;
        }
        f.write_str("]")?;
        if let Some(addr) = self.external_addr() {
            write!(f, " external={addr}")?;
        }
        Ok(())
    }
}
