use crate::*;

use std::time::Duration;

use pushpoint_core::config::RegistryConfig;
use pushpoint_services::spawn_sweeper;

fn no_grace() -> RegistryConfig {
    RegistryConfig {
        idle_grace_secs: 0,
        ..RegistryConfig::default()
    }
}

/// Entries survive while a live handle exists and go once the last one is
/// dropped.
#[test]
fn test_entry_lives_as_long_as_its_handles() {
    let factory = factory_with(no_grace());
    let registry = factory.registry();

    let mut first = factory.from_http(&format!("{GUID_HEX};20.30.40.1:100")).unwrap();
    first.update_proxies(true);
    let mut second = first.clone();
    second.update_proxies(true);
    assert_eq!(registry.interest(&guid()), 2);

    drop(first);
    assert_eq!(registry.sweep(), 0);
    assert_eq!(second.proxies().len(), 1);

    drop(second);
    assert_eq!(registry.interest(&guid()), 0);
    assert_eq!(registry.sweep(), 1);
    assert!(registry.resolve(&guid()).is_none());
}

/// Detached copies hold no interest.
#[test]
fn test_cached_copy_does_not_pin() {
    let factory = factory_with(no_grace());
    let registry = factory.registry();

    let mut endpoint = factory.from_http(&format!("{GUID_HEX};20.30.40.1:100")).unwrap();
    endpoint.update_proxies(true);
    drop(endpoint);

    let cached = factory.cached(&guid()).unwrap();
    assert_eq!(registry.sweep(), 1);
    assert_eq!(cached.proxies().len(), 1);
    assert!(factory.cached(&guid()).is_none());
}

/// Registering interest pins an entry without touching it.
#[test]
fn test_register_interest_pins() {
    let factory = factory_with(no_grace());
    let registry = factory.registry();

    assert!(registry.register_interest(&guid()).is_none());

    registry.overwrite_proxies_from_header(guid(), "20.30.40.1:100");
    let handle = registry.register_interest(&guid()).unwrap();
    assert_eq!(registry.sweep(), 0);
    assert_eq!(handle.resolve().proxies().len(), 1);

    drop(handle);
    assert_eq!(registry.sweep(), 1);
}

/// The grace window keeps recently used entries around.
#[test]
fn test_grace_window_keeps_recent_entries() {
    let factory = factory();
    let registry = factory.registry();

    let mut endpoint = factory.from_http(&format!("{GUID_HEX};20.30.40.1:100")).unwrap();
    endpoint.update_proxies(true);
    drop(endpoint);

    assert_eq!(registry.sweep(), 0);
    assert_eq!(registry.evict_idle(Duration::ZERO), 1);
}

/// Going over capacity drops idle entries straight away, but never a held
/// one.
#[test]
fn test_capacity_eviction_spares_held_entries() {
    let factory = factory_with(RegistryConfig {
        max_entries: 4,
        ..RegistryConfig::default()
    });
    let registry = factory.registry();

    let mut held = factory.from_http(&format!("{GUID_HEX};20.30.40.1:100")).unwrap();
    held.update_proxies(true);

    for n in 1..=20u8 {
        let mut transient = factory.from_parts(
            ClientGuid::new([n; 16]),
            Default::default(),
            Default::default(),
            None,
        );
        transient.update_proxies(true);
    }

    assert!(registry.len() <= 4);
    assert!(registry.resolve(&guid()).is_some());
    assert!(held.is_live());
}

/// Clearing the registry forgets what a live handle knew, but the handle
/// keeps following its entry through later updates and sweeps.
#[test]
fn test_clear_keeps_handles_tracking() {
    let factory = factory_with(no_grace());
    let registry = factory.registry();

    let mut endpoint = factory.from_http(&format!("{GUID_HEX};20.30.40.1:100")).unwrap();
    endpoint.update_proxies(true);

    registry.clear();
    assert_eq!(registry.len(), 1);
    assert!(endpoint.is_live());
    assert!(endpoint.proxies().is_empty());

    registry.overwrite_proxies_from_header(guid(), "20.30.40.2:200");
    assert_eq!(registry.sweep(), 0);
    assert_eq!(endpoint.proxies().len(), 1);
    assert!(endpoint.proxies().contains(&public(2, 200)));

    // Its own proxies merge back in on the next signal.
    endpoint.update_proxies(true);
    assert_eq!(endpoint.proxies().len(), 2);
    assert_eq!(registry.len(), 1);
}

/// The background sweeper drops idle entries on its own.
#[tokio::test(start_paused = true)]
async fn test_background_sweeper() {
    let factory = factory_with(no_grace());
    let registry = factory.registry().clone();

    let mut endpoint = factory.from_http(&format!("{GUID_HEX};20.30.40.1:100")).unwrap();
    endpoint.update_proxies(true);
    drop(endpoint);

    let task = spawn_sweeper(registry.clone(), Duration::from_secs(1));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(registry.is_empty());
    task.abort();
}
