//! Push endpoint handles.
//!
//! A remote handle starts detached, answering from the fields it was built
//! with. The first proxy validity signal merges it into the registry and
//! from then on it is live: every read resolves the canonical entry, so it
//! picks up proxies other sources have learned since.
//!
//! Our own endpoint is a separate variant backed by a [`LocalPeer`]. It is
//! authoritative by definition and never touches the registry.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddrV4;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use pushpoint_core::config::{ConfigError, LocalConfig};
use pushpoint_core::endpoint::MAX_FWT_VERSION;
use pushpoint_core::{
    encode_binary, encode_text, ClientGuid, EndpointState, Features, ProxySet,
};

use crate::registry::{CanonicalHandle, EndpointRegistry};

// ── Local peer ────────────────────────────────────────────────────────────────

/// Source of our own addressing state. Implemented by whatever tracks our
/// proxy connections and NAT status.
pub trait LocalPeer: Send + Sync {
    fn client_guid(&self) -> ClientGuid;

    /// Proxies, features and external address as of a single moment.
    fn state(&self) -> EndpointState;
}

/// [`LocalPeer`] with settable state, seeded from config.
pub struct StaticLocalPeer {
    guid: ClientGuid,
    inner: RwLock<LocalState>,
}

struct LocalState {
    proxies: ProxySet,
    fwt_version: u8,
    external_addr: Option<SocketAddrV4>,
}

impl StaticLocalPeer {
    pub fn new(guid: ClientGuid) -> Self {
        Self {
            guid,
            inner: RwLock::new(LocalState {
                proxies: ProxySet::new(),
                fwt_version: 0,
                external_addr: None,
            }),
        }
    }

    pub fn from_config(config: &LocalConfig) -> Result<Self, ConfigError> {
        let peer = Self::new(config.guid()?);
        {
            let mut inner = peer.inner.write();
            inner.proxies = config.proxies()?;
            inner.fwt_version = config.fwt();
            inner.external_addr = config.external()?;
        }
        Ok(peer)
    }

    pub fn set_proxies(&self, proxies: ProxySet) {
        self.inner.write().proxies = proxies;
    }

    /// Versions above the highest known one are clamped.
    pub fn set_fwt_version(&self, version: u8) {
        self.inner.write().fwt_version = version.min(MAX_FWT_VERSION);
    }

    pub fn set_external_addr(&self, addr: Option<SocketAddrV4>) {
        self.inner.write().external_addr = addr;
    }
}

impl LocalPeer for StaticLocalPeer {
    fn client_guid(&self) -> ClientGuid {
        self.guid
    }

    fn state(&self) -> EndpointState {
        let inner = self.inner.read();
        EndpointState::new(
            self.guid,
            inner.proxies.clone(),
            Features::with_fwt(inner.fwt_version),
            inner.external_addr,
        )
    }
}

// ── Handles ───────────────────────────────────────────────────────────────────

/// Our own endpoint.
#[derive(Clone)]
pub struct LocalEndpoint {
    source: Arc<dyn LocalPeer>,
}

impl LocalEndpoint {
    pub fn new(source: Arc<dyn LocalPeer>) -> Self {
        Self { source }
    }

    fn snapshot(&self) -> EndpointState {
        self.source.state()
    }
}

/// Another peer's endpoint.
#[derive(Clone)]
pub struct RemoteEndpoint {
    /// Fields as constructed. Answers reads until the handle goes live.
    state: EndpointState,
    registry: EndpointRegistry,
    canonical: Option<CanonicalHandle>,
}

impl RemoteEndpoint {
    pub fn new(state: EndpointState, registry: EndpointRegistry) -> Self {
        Self {
            state,
            registry,
            canonical: None,
        }
    }

    fn snapshot(&self) -> EndpointState {
        match &self.canonical {
            Some(canonical) => canonical.resolve(),
            None => self.state.clone(),
        }
    }

    fn update_proxies(&mut self, valid: bool) {
        let canonical = self.registry.update_proxies(&self.state, valid);
        if self.canonical.is_none() {
            tracing::trace!(guid = %self.state.guid(), "endpoint is live");
        }
        self.canonical = Some(canonical);
    }
}

/// A push endpoint: ours, or a remote peer's.
#[derive(Clone)]
pub enum PushEndpoint {
    Local(LocalEndpoint),
    Remote(RemoteEndpoint),
}

impl PushEndpoint {
    pub fn guid(&self) -> ClientGuid {
        match self {
            PushEndpoint::Local(local) => local.source.client_guid(),
            PushEndpoint::Remote(remote) => remote.state.guid(),
        }
    }

    /// Current state as a detached value, for serializing or storing.
    pub fn snapshot(&self) -> EndpointState {
        match self {
            PushEndpoint::Local(local) => local.snapshot(),
            PushEndpoint::Remote(remote) => remote.snapshot(),
        }
    }

    pub fn proxies(&self) -> ProxySet {
        self.snapshot().proxies().clone()
    }

    pub fn features(&self) -> Features {
        self.snapshot().features()
    }

    pub fn fwt_version(&self) -> u8 {
        self.snapshot().fwt_version()
    }

    pub fn supports_fwt(&self) -> bool {
        self.fwt_version() > 0
    }

    pub fn external_addr(&self) -> Option<SocketAddrV4> {
        self.snapshot().external_addr()
    }

    pub fn is_local(&self) -> bool {
        matches!(self, PushEndpoint::Local(_))
    }

    /// True once a remote handle has been merged into the registry.
    pub fn is_live(&self) -> bool {
        matches!(self, PushEndpoint::Remote(remote) if remote.canonical.is_some())
    }

    /// Signal that this endpoint's proxies worked (`valid`) or failed.
    ///
    /// Merges them into the registry and makes the handle live. No-op for
    /// our own endpoint.
    pub fn update_proxies(&mut self, valid: bool) {
        match self {
            PushEndpoint::Local(_) => {}
            PushEndpoint::Remote(remote) => remote.update_proxies(valid),
        }
    }

    pub fn to_bytes(&self, include_tls: bool) -> Bytes {
        encode_binary(&self.snapshot(), include_tls)
    }

    pub fn to_http_value(&self) -> String {
        encode_text(&self.snapshot())
    }
}

impl PartialEq for PushEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.guid() == other.guid()
    }
}

impl Eq for PushEndpoint {}

impl Hash for PushEndpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.guid().hash(state);
    }
}

impl fmt::Debug for PushEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            PushEndpoint::Local(_) => "local",
            PushEndpoint::Remote(remote) if remote.canonical.is_some() => "live",
            PushEndpoint::Remote(_) => "detached",
        };
        let state = self.snapshot();
        f.debug_struct("PushEndpoint")
            .field("kind", &kind)
            .field("state", &format_args!("{state}"))
            .finish()
    }
}

impl fmt::Display for PushEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.snapshot())
    }
}
