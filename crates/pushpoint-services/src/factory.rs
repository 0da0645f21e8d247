//! Endpoint factory: turns wire data into push endpoint handles.

use std::net::SocketAddrV4;
use std::sync::Arc;

use pushpoint_core::config::{ConfigError, PushpointConfig};
use pushpoint_core::{
    decode_binary, decode_text, ClientGuid, EndpointState, Features, ProxySet, WireError,
};

use crate::filter::{ProxyFilter, PublicAddressFilter};
use crate::handle::{LocalEndpoint, LocalPeer, PushEndpoint, RemoteEndpoint, StaticLocalPeer};
use crate::registry::EndpointRegistry;

/// Builds [`PushEndpoint`]s wired to one registry and one local peer.
#[derive(Clone)]
pub struct EndpointFactory {
    registry: EndpointRegistry,
    local: Arc<dyn LocalPeer>,
    filter: Arc<dyn ProxyFilter>,
}

impl EndpointFactory {
    pub fn new(
        registry: EndpointRegistry,
        local: Arc<dyn LocalPeer>,
        filter: Arc<dyn ProxyFilter>,
    ) -> Self {
        Self {
            registry,
            local,
            filter,
        }
    }

    /// Registry, local peer and filter all built from config.
    pub fn from_config(config: &PushpointConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            EndpointRegistry::new(&config.registry),
            Arc::new(StaticLocalPeer::from_config(&config.local)?),
            Arc::new(PublicAddressFilter::from_config(&config.filter)),
        ))
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Decode a binary endpoint at `offset`. Returns the handle and the
    /// number of bytes consumed.
    pub fn from_bytes(&self, buf: &[u8], offset: usize) -> Result<(PushEndpoint, usize), WireError> {
        let (state, used) = decode_binary(buf, offset)?;
        Ok((self.remote(self.admit(state)), used))
    }

    /// Decode an endpoint from its HTTP header form.
    pub fn from_http(&self, value: &str) -> Result<PushEndpoint, WireError> {
        let state = decode_text(value)?;
        Ok(self.remote(self.admit(state)))
    }

    /// Endpoint from fields we sourced ourselves, e.g. a download's
    /// response headers. Not filtered.
    pub fn from_parts(
        &self,
        guid: ClientGuid,
        proxies: ProxySet,
        features: Features,
        external_addr: Option<SocketAddrV4>,
    ) -> PushEndpoint {
        self.remote(EndpointState::new(guid, proxies, features, external_addr))
    }

    /// Our own endpoint.
    pub fn for_self(&self) -> PushEndpoint {
        PushEndpoint::Local(LocalEndpoint::new(self.local.clone()))
    }

    /// Detached copy of what the registry knows about `guid`.
    pub fn cached(&self, guid: &ClientGuid) -> Option<PushEndpoint> {
        self.registry.resolve(guid).map(|state| self.remote(state))
    }

    fn remote(&self, state: EndpointState) -> PushEndpoint {
        PushEndpoint::Remote(RemoteEndpoint::new(state, self.registry.clone()))
    }

    /// Drop proxies and external addresses the filter rejects.
    fn admit(&self, state: EndpointState) -> EndpointState {
        let proxies: ProxySet = state
            .proxies()
            .iter()
            .filter(|p| self.filter.allow_proxy(&p.addr))
            .collect();
        let external = state
            .external_addr()
            .filter(|addr| self.filter.allow_external(addr));
        EndpointState::new(state.guid(), proxies, state.features(), external)
    }
}
