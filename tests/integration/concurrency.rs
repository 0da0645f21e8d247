use crate::*;

use std::thread;

use pushpoint_core::{EndpointState, Features, ProxySet, PushProxy};

const THREADS: u8 = 8;
const PER_THREAD: u16 = 25;

fn disjoint_proxies(thread: u8) -> ProxySet {
    (1..=PER_THREAD)
        .map(|port| PushProxy::plain(public(thread + 1, port)))
        .collect()
}

/// Concurrent valid updates for one GUID lose nothing.
#[test]
fn test_concurrent_updates_union_exactly() {
    let factory = factory();

    thread::scope(|s| {
        for t in 0..THREADS {
            let factory = factory.clone();
            s.spawn(move || {
                for proxy in disjoint_proxies(t).iter() {
                    let mut one = factory.from_parts(
                        guid(),
                        std::iter::once(proxy).collect(),
                        Features::default(),
                        None,
                    );
                    one.update_proxies(true);
                }
            });
        }
    });

    let state = factory.registry().resolve(&guid()).unwrap();
    assert_eq!(state.proxies().len(), THREADS as usize * PER_THREAD as usize);
    for t in 0..THREADS {
        for proxy in disjoint_proxies(t).iter() {
            assert!(state.proxies().contains(&proxy.addr));
        }
    }
}

/// Racing first updates create exactly one entry, and every handle they
/// return refers to it.
#[test]
fn test_concurrent_first_update_creates_one_entry() {
    let factory = factory();
    let registry = factory.registry().clone();

    let handles: Vec<_> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let registry = registry.clone();
                s.spawn(move || {
                    let candidate = EndpointState::new(
                        guid(),
                        std::iter::once(PushProxy::plain(public(t + 1, 1))).collect(),
                        Features::default(),
                        None,
                    );
                    registry.update_proxies(&candidate, true)
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.interest(&guid()), THREADS as usize);
    for handle in &handles {
        assert_eq!(handle.resolve().proxies().len(), THREADS as usize);
    }
}

/// Updates for different peers proceed side by side.
#[test]
fn test_concurrent_updates_across_peers() {
    let factory = factory();

    thread::scope(|s| {
        for t in 0..THREADS {
            let factory = factory.clone();
            s.spawn(move || {
                let mut endpoint = factory.from_parts(
                    ClientGuid::new([t + 1; 16]),
                    disjoint_proxies(t),
                    Features::with_fwt(1),
                    None,
                );
                endpoint.update_proxies(true);
                endpoint.update_proxies(false);
            });
        }
    });

    let registry = factory.registry();
    assert_eq!(registry.len(), THREADS as usize);
    for t in 0..THREADS {
        let state = registry.resolve(&ClientGuid::new([t + 1; 16])).unwrap();
        assert!(state.proxies().is_empty());
        assert_eq!(state.fwt_version(), 1);
    }
}
