//! pushpoint-services: the canonical push-endpoint registry and the
//! handles and factory built on it.

pub mod factory;
pub mod filter;
pub mod handle;
pub mod registry;
pub mod sweeper;

pub use factory::EndpointFactory;
pub use filter::{ProxyFilter, PublicAddressFilter};
pub use handle::{LocalEndpoint, LocalPeer, PushEndpoint, RemoteEndpoint, StaticLocalPeer};
pub use registry::{CanonicalHandle, EndpointRegistry};
pub use sweeper::{spawn_sweeper, sweep_loop};
