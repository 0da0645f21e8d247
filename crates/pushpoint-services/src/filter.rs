//! Proxy admission: which decoded addresses are worth keeping.
//!
//! A proxy on a private network, or one we have marked hostile, can never
//! relay a push for us. Such entries are dropped as soon as they are
//! decoded so they never reach the registry.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};

use pushpoint_core::config::FilterConfig;

pub trait ProxyFilter: Send + Sync {
    /// Keep `addr` as a push proxy?
    fn allow_proxy(&self, addr: &SocketAddrV4) -> bool;

    /// Keep `addr` as a peer's external address?
    fn allow_external(&self, addr: &SocketAddrV4) -> bool;
}

/// Rejects non-routable and hostile addresses.
#[derive(Debug, Clone, Default)]
pub struct PublicAddressFilter {
    allow_private: bool,
    hostile: HashSet<Ipv4Addr>,
}

impl PublicAddressFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config. Unparseable hostile entries are logged and skipped.
    pub fn from_config(config: &FilterConfig) -> Self {
        let mut hostile = HashSet::new();
        for entry in &config.hostile {
            match entry.parse::<Ipv4Addr>() {
                Ok(ip) => {
                    hostile.insert(ip);
                }
                Err(e) => tracing::warn!(entry = %entry, error = %e, "bad hostile address"),
            }
        }
        Self {
            allow_private: config.allow_private,
            hostile,
        }
    }

    pub fn block(&mut self, ip: Ipv4Addr) {
        self.hostile.insert(ip);
    }

    fn is_public(&self, ip: &Ipv4Addr) -> bool {
        self.allow_private
            || !(ip.is_private()
                || ip.is_loopback()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast()
                || ip.is_multicast())
    }
}

impl ProxyFilter for PublicAddressFilter {
    fn allow_proxy(&self, addr: &SocketAddrV4) -> bool {
        if !self.is_public(addr.ip()) {
            tracing::debug!(proxy = %addr, "push proxy not public");
            return false;
        }
        if self.hostile.contains(addr.ip()) {
            tracing::debug!(proxy = %addr, "push proxy hostile");
            return false;
        }
        true
    }

    fn allow_external(&self, addr: &SocketAddrV4) -> bool {
        self.is_public(addr.ip())
    }
}
