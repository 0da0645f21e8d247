use crate::*;

use pushpoint_core::EndpointState;

/// Two sources report different proxies for one peer. Once both are live
/// they read the union, and so does a third handle made later.
#[test]
fn test_two_sources_converge_on_union() {
    let factory = factory();

    let mut from_query = factory
        .from_http(&format!("{GUID_HEX};fwt/1;20.30.40.1:100"))
        .unwrap();
    let mut from_pong = factory
        .from_http(&format!("{GUID_HEX};pptls=8;20.30.40.2:200"))
        .unwrap();

    // Detached handles only know their own fields.
    assert_eq!(from_query.proxies().len(), 1);
    assert!(factory.registry().is_empty());

    from_query.update_proxies(true);
    from_pong.update_proxies(true);
    assert_eq!(factory.registry().len(), 1);

    for endpoint in [&from_query, &from_pong] {
        let proxies = endpoint.proxies();
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies.tls(&public(2, 200)), Some(true));
        assert!(endpoint.is_live());
    }

    // Features came from whichever source created the entry.
    assert_eq!(from_pong.fwt_version(), 1);

    let cached = factory.cached(&guid()).unwrap();
    assert_eq!(cached.proxies().len(), 2);
    assert!(!cached.is_live());
}

/// A failed connection attempt removes the proxies it tried, leaving those
/// learned elsewhere.
#[test]
fn test_invalid_update_subtracts() {
    let factory = factory();

    let mut first = factory
        .from_http(&format!("{GUID_HEX};20.30.40.1:100;20.30.40.2:200"))
        .unwrap();
    first.update_proxies(true);

    let mut failed = factory
        .from_http(&format!("{GUID_HEX};20.30.40.1:100"))
        .unwrap();
    failed.update_proxies(false);

    let proxies = first.proxies();
    assert_eq!(proxies.len(), 1);
    assert!(proxies.contains(&public(2, 200)));
    assert_eq!(failed.proxies(), proxies);
}

/// Attribute updates are last-write-wins and visible to every live handle.
#[test]
fn test_attribute_updates_are_shared() {
    let factory = factory();
    let registry = factory.registry();

    let mut endpoint = factory
        .from_http(&format!("{GUID_HEX};20.30.40.1:100"))
        .unwrap();
    endpoint.update_proxies(true);

    registry.set_fwt_version(guid(), 2);
    registry.set_external_addr(guid(), Some(public(9, 6346)));
    assert_eq!(endpoint.fwt_version(), 2);
    assert_eq!(endpoint.external_addr(), Some(public(9, 6346)));
    assert!(endpoint.to_http_value().ends_with(";6346:20.30.40.9"));

    registry.set_fwt_version(guid(), 0);
    assert_eq!(endpoint.external_addr(), None);

    assert!(registry.remove_proxy(&guid(), &public(1, 100)));
    assert!(endpoint.proxies().is_empty());
}

/// A download's proxy header replaces everything known so far.
#[test]
fn test_overwrite_from_header() {
    let factory = factory();
    let registry = factory.registry();

    let handle = registry.update_proxies(
        &EndpointState::new(
            guid(),
            [public(1, 100), public(2, 200)]
                .into_iter()
                .map(pushpoint_core::PushProxy::plain)
                .collect(),
            Default::default(),
            None,
        ),
        true,
    );

    registry.overwrite_proxies_from_header(guid(), "pptls=8,20.30.40.7:700");
    let state = handle.resolve();
    assert_eq!(state.proxies().len(), 1);
    assert_eq!(state.proxies().tls(&public(7, 700)), Some(true));
}
