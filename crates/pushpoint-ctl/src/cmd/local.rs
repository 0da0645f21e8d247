//! Our own endpoint, as configured.

use anyhow::Result;

use pushpoint_services::EndpointFactory;

use super::output::print_endpoint;

pub fn cmd_local(factory: &EndpointFactory, include_tls: bool, json: bool) -> Result<()> {
    let endpoint = factory.for_self();
    if endpoint.proxies().is_empty() {
        tracing::info!("no push proxies configured; set [local].push_proxies");
    }
    print_endpoint(&endpoint, include_tls, json)
}
