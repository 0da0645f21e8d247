//! Rendering endpoints for humans and scripts.

use anyhow::Result;
use serde::Serialize;

use pushpoint_services::PushEndpoint;

#[derive(Serialize)]
pub struct EndpointView {
    pub guid: String,
    pub kind: &'static str,
    pub fwt_version: u8,
    pub reserved_features: u8,
    pub external_addr: Option<String>,
    pub proxies: Vec<ProxyView>,
    pub http: String,
    pub bytes: String,
}

#[derive(Serialize)]
pub struct ProxyView {
    pub addr: String,
    pub tls: bool,
}

impl EndpointView {
    pub fn of(endpoint: &PushEndpoint, include_tls: bool) -> Self {
        let state = endpoint.snapshot();
        Self {
            guid: state.guid().to_hex(),
            kind: if endpoint.is_local() { "local" } else { "remote" },
            fwt_version: state.fwt_version(),
            reserved_features: state.features().reserved,
            external_addr: state.external_addr().map(|a| a.to_string()),
            proxies: state
                .proxies()
                .iter()
                .map(|p| ProxyView {
                    addr: p.addr.to_string(),
                    tls: p.tls,
                })
                .collect(),
            http: endpoint.to_http_value(),
            bytes: hex::encode(endpoint.to_bytes(include_tls)),
        }
    }
}

pub fn print_endpoint(endpoint: &PushEndpoint, include_tls: bool, json: bool) -> Result<()> {
    let view = EndpointView::of(endpoint, include_tls);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Push Endpoint ({})", view.kind);
    println!("═══════════════════════════════════════");
    println!("  GUID        : {}", view.guid);
    println!("  FWT version : {}", view.fwt_version);
    if view.reserved_features != 0 {
        println!("  Reserved    : 0b{:02b}", view.reserved_features);
    }
    println!(
        "  External    : {}",
        view.external_addr.as_deref().unwrap_or("unknown")
    );

    if view.proxies.is_empty() {
        println!("\n  No push proxies.");
    } else {
        println!("\n  Proxies:");
        for p in &view.proxies {
            let tls = if p.tls { "  [tls]" } else { "" };
            println!("  ├─ {}{}", p.addr, tls);
        }
    }

    println!();
    println!("  Header : {}", view.http);
    println!("  Bytes  : {}", view.bytes);
    Ok(())
}
