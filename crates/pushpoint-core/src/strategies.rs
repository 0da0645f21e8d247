//! proptest strategies shared by the codec tests.

use std::net::{Ipv4Addr, SocketAddrV4};

use proptest::prelude::*;

use crate::endpoint::{EndpointState, Features, ProxySet, PushProxy};
use crate::guid::ClientGuid;

/// Public-looking, usable address. First octet starts at 2 so the
/// unknown-address placeholder never comes up.
pub fn arb_addr() -> impl Strategy<Value = SocketAddrV4> {
    (2u8..=223, any::<u8>(), any::<u8>(), 1u8..=254, 1u16..=u16::MAX)
        .prop_map(|(a, b, c, d, port)| SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), port))
}

pub fn arb_endpoint(max_proxies: usize) -> impl Strategy<Value = EndpointState> {
    (
        any::<[u8; 16]>(),
        prop::collection::vec((arb_addr(), any::<bool>()), 0..=max_proxies),
        0u8..=3,
        0u8..=3,
        prop::option::of(arb_addr()),
    )
        .prop_map(|(guid, proxies, fwt_version, reserved, external)| {
            let proxies: ProxySet = proxies
                .into_iter()
                .map(|(addr, tls)| PushProxy::new(addr, tls))
                .collect();
            EndpointState::new(
                ClientGuid::new(guid),
                proxies,
                Features {
                    fwt_version,
                    reserved,
                },
                external,
            )
        })
}
