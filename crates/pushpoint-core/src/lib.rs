//! pushpoint-core: push-endpoint value types and their wire formats.
//! Pure and stateless; the canonical registry lives in pushpoint-services.

pub mod config;
pub mod endpoint;
pub mod guid;
pub mod http;
pub mod wire;

#[cfg(test)]
mod strategies;

pub use endpoint::{EndpointState, Features, ProxySet, PushProxy};
pub use guid::ClientGuid;
pub use http::{decode_text, encode_text};
pub use wire::{decode_binary, encode_binary, WireError};
