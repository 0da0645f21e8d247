//! Binary push-endpoint format: the compact form carried in P2P messages.
//!
//! Layout, relative to the start of the endpoint:
//!
//! ```text
//!   [0]        header   bits 0-2 proxy count, 3-4 fwt version,
//!                       5-6 reserved features, 7 tls bitmap present
//!   [1..17]    client GUID
//!   [+6]       external address, only when fwt version > 0
//!   [+1]       tls bitmap, only when header bit 7 is set
//!   [+6 * n]   push proxies
//! ```
//!
//! Addresses are 4 bytes of IPv4 in network order followed by the port in
//! little-endian. The header can announce seven proxies but encoders never
//! write more than four; decoders accept all seven.

use std::mem::size_of;
use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::endpoint::{
    is_placeholder, EndpointState, Features, ProxySet, PushProxy, BOGUS_IP, DEFAULT_PORT,
};
use crate::guid::ClientGuid;

// ── Wire records ──────────────────────────────────────────────────────────────

/// Fixed prefix of every binary endpoint: header byte plus GUID.
///
/// Wire size: 17 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct EndpointPrefix {
    /// Packed count / version / flags. Unpack with [`Header::unpack`].
    pub header: u8,
    pub guid: [u8; 16],
}

assert_eq_size!(EndpointPrefix, [u8; 17]);

/// IPv4 address and port as written on the wire.
///
/// Wire size: 6 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct WireAddr {
    /// Network byte order.
    pub ip: [u8; 4],
    /// Little-endian.
    pub port: [u8; 2],
}

assert_eq_size!(WireAddr, [u8; 6]);

impl WireAddr {
    pub fn from_socket(addr: &SocketAddrV4) -> Self {
        Self {
            ip: addr.ip().octets(),
            port: addr.port().to_le_bytes(),
        }
    }

    pub fn to_socket(self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.ip), u16::from_le_bytes(self.port))
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

pub const SIZE_MASK: u8 = 0b0000_0111;
pub const FWT_VERSION_MASK: u8 = 0b0001_1000;
pub const FWT_VERSION_SHIFT: u8 = 3;
pub const RESERVED_MASK: u8 = 0b0110_0000;
pub const RESERVED_SHIFT: u8 = 5;
pub const TLS_BITMAP_FLAG: u8 = 0b1000_0000;

const PREFIX_LEN: usize = size_of::<EndpointPrefix>();
const ADDR_LEN: usize = size_of::<WireAddr>();

/// The header byte, unpacked into named fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub proxy_count: u8,
    pub features: Features,
    pub tls_bitmap: bool,
}

impl Header {
    pub fn unpack(byte: u8) -> Self {
        Self {
            proxy_count: byte & SIZE_MASK,
            features: Features {
                fwt_version: (byte & FWT_VERSION_MASK) >> FWT_VERSION_SHIFT,
                reserved: (byte & RESERVED_MASK) >> RESERVED_SHIFT,
            },
            tls_bitmap: byte & TLS_BITMAP_FLAG != 0,
        }
    }

    pub fn pack(&self) -> u8 {
        let mut byte = self.proxy_count & SIZE_MASK;
        byte |= (self.features.fwt_version << FWT_VERSION_SHIFT) & FWT_VERSION_MASK;
        byte |= (self.features.reserved << RESERVED_SHIFT) & RESERVED_MASK;
        if self.tls_bitmap {
            byte |= TLS_BITMAP_FLAG;
        }
        byte
    }

    /// Total encoded length this header implies, prefix included.
    pub fn encoded_len(&self) -> usize {
        let mut len = PREFIX_LEN + self.proxy_count as usize * ADDR_LEN;
        if self.features.supports_fwt() {
            len += ADDR_LEN;
        }
        if self.tls_bitmap {
            len += 1;
        }
        len
    }
}

/// Bit of the TLS bitmap byte that marks the proxy at `index`.
/// Counted from the most significant bit.
pub fn tls_bit(index: usize) -> u8 {
    if index < 8 {
        0x80 >> index
    } else {
        0
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Malformed push-endpoint data. Every variant is a bad-format condition:
/// decoding stops and no partial endpoint is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("truncated endpoint: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("offset {offset} is past the end of a {len}-byte buffer")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("unusable address: {0}")]
    InvalidAddress(SocketAddrV4),

    #[error("missing client guid")]
    MissingGuid,

    #[error("invalid client guid")]
    InvalidGuid,

    #[error("invalid feature version: {0:?}")]
    InvalidFeatureVersion(String),
}

// ── Decoding ──────────────────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn read<T: FromBytes>(&mut self) -> Result<T, WireError> {
        let value = T::read_from_prefix(&self.buf[self.pos..]).ok_or(WireError::Truncated {
            needed: self.pos + size_of::<T>(),
            available: self.buf.len(),
        })?;
        self.pos += size_of::<T>();
        Ok(value)
    }
}

fn checked_addr(raw: WireAddr) -> Result<SocketAddrV4, WireError> {
    let addr = raw.to_socket();
    if addr.port() == 0 || addr.ip().is_unspecified() {
        return Err(WireError::InvalidAddress(addr));
    }
    Ok(addr)
}

/// Decode one endpoint starting at `offset`.
///
/// Returns the endpoint and the number of bytes it occupied.
pub fn decode_binary(buf: &[u8], offset: usize) -> Result<(EndpointState, usize), WireError> {
    let input = buf.get(offset..).ok_or(WireError::OffsetOutOfRange {
        offset,
        len: buf.len(),
    })?;
    let mut reader = Reader { buf: input, pos: 0 };

    let prefix: EndpointPrefix = reader.read()?;
    let header = Header::unpack(prefix.header);

    // Check the whole declared length before reading anything else.
    let needed = header.encoded_len();
    if input.len() < needed {
        return Err(WireError::Truncated {
            needed,
            available: input.len(),
        });
    }

    let guid = ClientGuid::new(prefix.guid);

    let mut external_addr = None;
    if header.features.supports_fwt() {
        let raw: WireAddr = reader.read()?;
        let addr = raw.to_socket();
        if is_placeholder(&addr) {
            tracing::trace!(guid = %guid, "external address unknown");
        } else {
            external_addr = Some(checked_addr(raw)?);
        }
    }

    let bitmap = if header.tls_bitmap {
        reader.read::<u8>()?
    } else {
        0
    };

    let mut proxies = ProxySet::new();
    for index in 0..header.proxy_count as usize {
        let addr = checked_addr(reader.read()?)?;
        proxies.insert(PushProxy::new(addr, bitmap & tls_bit(index) != 0));
    }

    let state = EndpointState::new(guid, proxies, header.features, external_addr);
    Ok((state, reader.pos))
}

// ── Encoding ──────────────────────────────────────────────────────────────────

fn header_for(state: &EndpointState, include_tls: bool) -> (Header, u8) {
    let mut count = 0u8;
    let mut bitmap = 0u8;
    for (index, proxy) in state.proxies().encodable().enumerate() {
        count += 1;
        if proxy.tls {
            bitmap |= tls_bit(index);
        }
    }
    if !include_tls {
        bitmap = 0;
    }
    let header = Header {
        proxy_count: count,
        features: state.features(),
        tls_bitmap: bitmap != 0,
    };
    (header, bitmap)
}

/// Exact length [`encode_binary`] will produce for `state`.
pub fn encoded_len(state: &EndpointState, include_tls: bool) -> usize {
    header_for(state, include_tls).0.encoded_len()
}

/// Encode `state`, writing at most four proxies.
///
/// The TLS bitmap is written only when `include_tls` is set and at least
/// one written proxy is TLS-capable.
pub fn encode_binary(state: &EndpointState, include_tls: bool) -> Bytes {
    let (header, bitmap) = header_for(state, include_tls);
    let mut out = BytesMut::with_capacity(header.encoded_len());

    let prefix = EndpointPrefix {
        header: header.pack(),
        guid: *state.guid().as_bytes(),
    };
    out.put_slice(prefix.as_bytes());

    if state.supports_fwt() {
        let external = state
            .external_addr()
            .unwrap_or(SocketAddrV4::new(BOGUS_IP, DEFAULT_PORT));
        out.put_slice(WireAddr::from_socket(&external).as_bytes());
    }

    if header.tls_bitmap {
        out.put_u8(bitmap);
    }

    for proxy in state.proxies().encodable() {
        out.put_slice(WireAddr::from_socket(&proxy.addr).as_bytes());
    }

    out.freeze()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
