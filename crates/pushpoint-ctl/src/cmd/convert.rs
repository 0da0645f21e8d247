//! Decoding and converting wire data given on the command line.

use anyhow::{Context, Result};

use pushpoint_services::{EndpointFactory, PushEndpoint};

use super::output::print_endpoint;

fn from_hex(factory: &EndpointFactory, hex_bytes: &str) -> Result<PushEndpoint> {
    let bytes = hex::decode(hex_bytes.trim()).context("argument is not valid hex")?;
    let (endpoint, used) = factory
        .from_bytes(&bytes, 0)
        .context("failed to decode binary endpoint")?;
    if used < bytes.len() {
        tracing::warn!(trailing = bytes.len() - used, "ignoring bytes after endpoint");
    }
    Ok(endpoint)
}

fn from_header(factory: &EndpointFactory, value: &str) -> Result<PushEndpoint> {
    factory
        .from_http(value)
        .context("failed to decode header endpoint")
}

pub fn cmd_decode_bytes(factory: &EndpointFactory, hex_bytes: &str, include_tls: bool, json: bool) -> Result<()> {
    let endpoint = from_hex(factory, hex_bytes)?;
    print_endpoint(&endpoint, include_tls, json)
}

pub fn cmd_decode_header(factory: &EndpointFactory, value: &str, include_tls: bool, json: bool) -> Result<()> {
    let endpoint = from_header(factory, value)?;
    print_endpoint(&endpoint, include_tls, json)
}

pub fn cmd_to_header(factory: &EndpointFactory, hex_bytes: &str) -> Result<()> {
    let endpoint = from_hex(factory, hex_bytes)?;
    println!("{}", endpoint.to_http_value());
    Ok(())
}

pub fn cmd_to_bytes(factory: &EndpointFactory, value: &str, include_tls: bool) -> Result<()> {
    let endpoint = from_header(factory, value)?;
    println!("{}", hex::encode(endpoint.to_bytes(include_tls)));
    Ok(())
}
