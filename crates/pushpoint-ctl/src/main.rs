//! pushpoint-ctl: inspect and convert push endpoints offline.

use anyhow::{Context, Result};

use pushpoint_core::config::PushpointConfig;
use pushpoint_services::EndpointFactory;

mod cmd;

use cmd::convert::{cmd_decode_bytes, cmd_decode_header, cmd_to_bytes, cmd_to_header};
use cmd::local::cmd_local;
use cmd::merge::cmd_merge;

fn print_usage() {
    println!("Usage: pushpoint-ctl [--json] [--no-tls] <command>");
    println!();
    println!("Commands:");
    println!("  decode-bytes <hex>     Decode a binary push endpoint");
    println!("  decode-header <value>  Decode an HTTP header push endpoint");
    println!("  to-header <hex>        Convert a binary endpoint to header form");
    println!("  to-bytes <value>       Convert a header endpoint to binary (hex)");
    println!("  merge <value>...       Merge header endpoints for one peer");
    println!("  local                  Show our own endpoint from config");
    println!("  init-config            Write a default config file if none exists");
    println!();
    println!("Options:");
    println!("  --json     Print JSON instead of text");
    println!("  --no-tls   Leave the TLS bitmap out of binary output");
    println!();
    println!("Private proxies are dropped unless PUSHPOINT_FILTER__ALLOW_PRIVATE=1.");
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut json = false;
    let mut include_tls = true;
    let mut remaining: Vec<&str> = Vec::new();
    for arg in &args {
        match arg.as_str() {
            "--json" => json = true,
            "--no-tls" => include_tls = false,
            other => remaining.push(other),
        }
    }

    let config = PushpointConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PushpointConfig::default()
    });
    let factory = EndpointFactory::from_config(&config).context("invalid [local] config")?;

    match remaining.as_slice() {
        ["decode-bytes", hex] => cmd_decode_bytes(&factory, hex, include_tls, json),
        ["decode-header", value] => cmd_decode_header(&factory, value, include_tls, json),
        ["to-header", hex] => cmd_to_header(&factory, hex),
        ["to-bytes", value] => cmd_to_bytes(&factory, value, include_tls),
        ["merge", values @ ..] if !values.is_empty() => {
            cmd_merge(&factory, values, include_tls, json)
        }
        ["local"] => cmd_local(&factory, include_tls, json),
        ["init-config"] => {
            let path = PushpointConfig::write_default_if_missing()
                .context("failed to write default config")?;
            println!("{}", path.display());
            Ok(())
        }
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
