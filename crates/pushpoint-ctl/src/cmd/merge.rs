//! Fold several sightings of one peer into its canonical endpoint.

use anyhow::{bail, Context, Result};

use pushpoint_services::EndpointFactory;

use super::output::print_endpoint;

/// Decode each header value, mark its proxies valid, and print what the
/// registry ends up with.
pub fn cmd_merge(factory: &EndpointFactory, values: &[&str], include_tls: bool, json: bool) -> Result<()> {
    let mut live = Vec::with_capacity(values.len());
    for value in values {
        let mut endpoint = factory
            .from_http(value)
            .with_context(|| format!("failed to decode {value:?}"))?;
        if let Some(first) = live.first() {
            if endpoint != *first {
                bail!("{} is not the same peer as {}", endpoint.guid(), first.guid());
            }
        }
        endpoint.update_proxies(true);
        live.push(endpoint);
    }

    let Some(merged) = live.last() else {
        bail!("nothing to merge");
    };
    tracing::debug!(sources = live.len(), guid = %merged.guid(), "merged endpoints");
    print_endpoint(merged, include_tls, json)
}
