//! Text push-endpoint format: the form exchanged in HTTP headers.
//!
//! An endpoint is a `;`-separated token list:
//!
//! ```text
//!   <32 hex guid>[;fwt/<version>][;pptls=<hex>][;<ip>:<port>]*[;<port>:<ip>]
//! ```
//!
//! Only the GUID is positional. Every other token is recognised by shape, so
//! decoders tolerate reordering and skip anything they do not understand.
//! `pptls` marks which of the proxies that follow it accept TLS: one bit per
//! proxy, most significant bit of the first hex digit first.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::endpoint::{
    is_placeholder, EndpointState, Features, ProxySet, PushProxy, MAX_DECODED_PROXIES,
    MAX_FWT_VERSION,
};
use crate::guid::ClientGuid;
use crate::wire::WireError;

/// Feature name for firewall-to-firewall transfer support.
pub const FWT_FEATURE: &str = "fwt";

/// Key of the TLS bitmap token.
pub const PPTLS: &str = "pptls";

/// Separator between endpoint tokens.
pub const ENDPOINT_SEPARATOR: &str = ";";

/// Separator used by the `X-Push-Proxies` header.
pub const PROXY_LIST_SEPARATOR: &str = ",";

/// Longest bitmap accepted, in hex digits.
const MAX_BITMAP_DIGITS: usize = 16;

// ── TLS bitmap ────────────────────────────────────────────────────────────────

/// Per-proxy TLS flags in their hex-digit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsBitmap {
    nibbles: Vec<u8>,
}

impl TlsBitmap {
    pub fn from_flags(flags: impl IntoIterator<Item = bool>) -> Self {
        let mut nibbles = Vec::new();
        for (index, flag) in flags.into_iter().enumerate() {
            if index % 4 == 0 {
                nibbles.push(0);
            }
            if flag {
                if let Some(last) = nibbles.last_mut() {
                    *last |= 0x8 >> (index % 4);
                }
            }
        }
        while nibbles.last() == Some(&0) {
            nibbles.pop();
        }
        Self { nibbles }
    }

    /// Parse the hex form. None if empty, too long, or not hex.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() || text.len() > MAX_BITMAP_DIGITS {
            return None;
        }
        let nibbles = text
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()?;
        Some(Self { nibbles })
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.nibbles
            .get(index / 4)
            .is_some_and(|n| n & (0x8 >> (index % 4)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.nibbles.iter().all(|n| *n == 0)
    }

    /// Upper-case hex, trailing zero digits trimmed.
    pub fn to_hex(&self) -> String {
        let mut out: String = self
            .nibbles
            .iter()
            .map(|n| char::from_digit(u32::from(*n), 16).unwrap_or('0'))
            .collect::<String>()
            .to_ascii_uppercase();
        while out.ends_with('0') {
            out.pop();
        }
        out
    }
}

// ── Tokens ────────────────────────────────────────────────────────────────────

enum Token<'a> {
    Feature { name: &'a str, version: &'a str },
    Bitmap(Option<TlsBitmap>),
    Proxy(SocketAddrV4),
    External(SocketAddrV4),
    /// Looked like an address but did not parse.
    BadAddress,
    Unknown,
}

fn classify(token: &str) -> Token<'_> {
    if let Some((key, value)) = token.split_once('=') {
        if key.trim().eq_ignore_ascii_case(PPTLS) {
            return Token::Bitmap(TlsBitmap::parse(value.trim()));
        }
        return Token::Unknown;
    }
    if let Some((name, version)) = token.split_once('/') {
        return Token::Feature {
            name: name.trim(),
            version: version.trim(),
        };
    }
    if let Some((left, right)) = token.split_once(':') {
        let (left, right) = (left.trim(), right.trim());
        if let (Ok(ip), Ok(port)) = (left.parse::<Ipv4Addr>(), right.parse::<u16>()) {
            return Token::Proxy(SocketAddrV4::new(ip, port));
        }
        if let (Ok(port), Ok(ip)) = (left.parse::<u16>(), right.parse::<Ipv4Addr>()) {
            return Token::External(SocketAddrV4::new(ip, port));
        }
        return Token::BadAddress;
    }
    Token::Unknown
}

fn usable(addr: &SocketAddrV4) -> bool {
    addr.port() != 0 && !addr.ip().is_unspecified()
}

/// Parse a feature version such as `1` or `1.0`. Only the major part counts.
fn parse_version(version: &str) -> Result<u8, WireError> {
    let invalid = || WireError::InvalidFeatureVersion(version.to_string());
    let (major, minor) = version.split_once('.').unwrap_or((version, ""));
    if !minor.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let major: u8 = major.parse().map_err(|_| invalid())?;
    if major > MAX_FWT_VERSION {
        return Err(invalid());
    }
    Ok(major)
}

/// Applies a TLS bitmap to proxies by the order they are met after it.
#[derive(Default)]
struct ProxyCollector {
    proxies: ProxySet,
    bitmap: Option<TlsBitmap>,
    seen: usize,
}

impl ProxyCollector {
    fn set_bitmap(&mut self, bitmap: Option<TlsBitmap>) {
        self.bitmap = bitmap;
        self.seen = 0;
    }

    fn push(&mut self, addr: SocketAddrV4, limit: usize) {
        let tls = self.bitmap.as_ref().is_some_and(|b| b.is_set(self.seen));
        self.seen += 1;
        if !usable(&addr) {
            tracing::trace!(proxy = %addr, "skipping unusable proxy");
            return;
        }
        if self.proxies.len() < limit {
            self.proxies.insert(PushProxy::new(addr, tls));
        }
    }

    /// A garbled proxy token shifts every later index, so stop trusting the
    /// bitmap.
    fn garbled(&mut self) {
        self.bitmap = None;
    }
}

// ── Endpoint codec ────────────────────────────────────────────────────────────

/// Decode an endpoint from its header form.
///
/// Fails only when the GUID token is missing or invalid, or the `fwt`
/// version cannot be read. Unknown feature tokens are dropped.
pub fn decode_text(value: &str) -> Result<EndpointState, WireError> {
    let mut tokens = value.split(ENDPOINT_SEPARATOR).map(str::trim);
    let first = tokens
        .next()
        .filter(|t| !t.is_empty())
        .ok_or(WireError::MissingGuid)?;
    let guid = ClientGuid::from_hex(first)?;

    let mut fwt_version = 0;
    let mut external = None;
    let mut collector = ProxyCollector::default();

    for token in tokens.filter(|t| !t.is_empty()) {
        match classify(token) {
            Token::Feature { name, version } => {
                if name.eq_ignore_ascii_case(FWT_FEATURE) {
                    fwt_version = parse_version(version)?;
                } else {
                    tracing::trace!(guid = %guid, feature = name, "dropping unknown feature");
                }
            }
            Token::Bitmap(bitmap) => collector.set_bitmap(bitmap),
            Token::Proxy(addr) => collector.push(addr, MAX_DECODED_PROXIES),
            Token::External(addr) => {
                if is_placeholder(&addr) || !usable(&addr) {
                    tracing::debug!(guid = %guid, addr = %addr, "ignoring external address");
                } else {
                    external = Some(addr);
                }
            }
            Token::BadAddress => collector.garbled(),
            Token::Unknown => {
                tracing::trace!(guid = %guid, token, "ignoring token");
            }
        }
    }

    Ok(EndpointState::new(
        guid,
        collector.proxies,
        Features::with_fwt(fwt_version),
        external,
    ))
}

/// Encode an endpoint into its header form, writing at most four proxies.
pub fn encode_text(state: &EndpointState) -> String {
    let mut out = state.guid().to_hex();

    if state.supports_fwt() {
        out.push_str(&format!(
            "{ENDPOINT_SEPARATOR}{FWT_FEATURE}/{}",
            state.fwt_version()
        ));
    }

    let written: Vec<PushProxy> = state.proxies().encodable().collect();
    let bitmap = TlsBitmap::from_flags(written.iter().map(|p| p.tls));
    if !bitmap.is_empty() {
        out.push_str(&format!("{ENDPOINT_SEPARATOR}{PPTLS}={}", bitmap.to_hex()));
    }
    for proxy in &written {
        out.push_str(&format!("{ENDPOINT_SEPARATOR}{}", proxy.addr));
    }

    if let Some(addr) = state.external_addr() {
        out.push_str(&format!("{ENDPOINT_SEPARATOR}{}:{}", addr.port(), addr.ip()));
    }
    out
}

// ── Proxy list codec ──────────────────────────────────────────────────────────

/// Encode the first `max` proxies as an `X-Push-Proxies` style value.
/// None for an empty set.
pub fn encode_proxy_list(proxies: &ProxySet, separator: &str, max: usize) -> Option<String> {
    let written: Vec<PushProxy> = proxies.iter().take(max).collect();
    if written.is_empty() {
        return None;
    }
    let mut tokens = Vec::with_capacity(written.len() + 1);
    let bitmap = TlsBitmap::from_flags(written.iter().map(|p| p.tls));
    if !bitmap.is_empty() {
        tokens.push(format!("{PPTLS}={}", bitmap.to_hex()));
    }
    tokens.extend(written.iter().map(|p| p.addr.to_string()));
    Some(tokens.join(separator))
}

/// Decode a proxy list value. Malformed tokens are skipped; the result may
/// be empty.
pub fn decode_proxy_list(value: &str, separator: &str) -> ProxySet {
    let mut collector = ProxyCollector::default();
    for token in value.split(separator).map(str::trim).filter(|t| !t.is_empty()) {
        match classify(token) {
            Token::Bitmap(bitmap) => collector.set_bitmap(bitmap),
            Token::Proxy(addr) => collector.push(addr, usize::MAX),
            Token::BadAddress => collector.garbled(),
            _ => tracing::trace!(token, "ignoring proxy list token"),
        }
    }
    collector.proxies
}

// ── Tests ─────────────────────────────────────────────────────────────────────
