use crate::*;

use pushpoint_core::WireError;

/// Binary endpoint with `count` plain proxies and no features.
fn raw_endpoint(count: u8) -> Vec<u8> {
    let mut buf = vec![count];
    buf.extend_from_slice(guid().as_bytes());
    for n in 0..count {
        buf.extend_from_slice(&[20, 30, 40, n + 1, 0x40, 0x00]);
    }
    buf
}

/// The header may declare up to seven proxies even though we only ever
/// write four.
#[test]
fn test_seven_proxies_decode() {
    let buf = raw_endpoint(7);
    let (endpoint, used) = factory().from_bytes(&buf, 0).unwrap();

    assert_eq!(used, 17 + 7 * 6);
    assert_eq!(endpoint.proxies().len(), 7);
    assert!(endpoint.proxies().contains(&public(7, 64)));

    // Re-encoding clamps to four.
    let reencoded = endpoint.to_bytes(true);
    assert_eq!(reencoded[0] & 0b111, 4);
    assert_eq!(reencoded.len(), 17 + 4 * 6);
}

/// Seven proxies declared but the buffer stops short: nothing is produced.
#[test]
fn test_seven_proxies_short_buffer() {
    let mut buf = raw_endpoint(7);
    buf.truncate(buf.len() - 1);

    let err = factory().from_bytes(&buf, 0).unwrap_err();
    assert_eq!(
        err,
        WireError::Truncated {
            needed: 17 + 7 * 6,
            available: 17 + 7 * 6 - 1,
        }
    );
}

/// Offsets past the end are rejected, not panicked on.
#[test]
fn test_offset_past_end() {
    let buf = raw_endpoint(1);
    let err = factory().from_bytes(&buf, buf.len() + 1).unwrap_err();
    assert!(matches!(err, WireError::OffsetOutOfRange { .. }));

    let err = factory().from_bytes(&buf, buf.len()).unwrap_err();
    assert!(matches!(err, WireError::Truncated { .. }));
}

/// A zero port in a proxy slot fails the decode.
#[test]
fn test_zero_port_proxy_rejected() {
    let mut buf = raw_endpoint(2);
    let last = buf.len();
    buf[last - 2] = 0;
    buf[last - 1] = 0;

    let err = factory().from_bytes(&buf, 0).unwrap_err();
    assert!(matches!(err, WireError::InvalidAddress(_)));
}

/// Header decode failures surface as errors; recoverable oddities do not.
#[test]
fn test_header_edge_cases() {
    let factory = factory();

    assert_eq!(factory.from_http("").unwrap_err(), WireError::MissingGuid);
    assert_eq!(factory.from_http("not-a-guid").unwrap_err(), WireError::InvalidGuid);
    assert!(matches!(
        factory.from_http(&format!("{GUID_HEX};fwt/x")).unwrap_err(),
        WireError::InvalidFeatureVersion(_)
    ));

    // Unknown features and junk are ignored.
    let endpoint = factory
        .from_http(&format!("{GUID_HEX};tls/1;garbage;20.30.40.50:60"))
        .unwrap();
    assert_eq!(endpoint.proxies().len(), 1);

    // A garbled address drops the bitmap for the proxies after it.
    let endpoint = factory
        .from_http(&format!("{GUID_HEX};pptls=C;20.30.40.50:60;20.30.40.x:1;20.30.40.51:61"))
        .unwrap();
    let proxies = endpoint.proxies();
    assert_eq!(proxies.tls(&addr("20.30.40.50:60")), Some(true));
    assert_eq!(proxies.tls(&addr("20.30.40.51:61")), Some(false));
}

/// Hex for the CLI path decodes the same as raw bytes.
#[test]
fn test_hex_input() {
    let hex_text = hex::encode(raw_endpoint(2));
    let bytes = hex::decode(hex_text).unwrap();
    let (endpoint, _) = factory().from_bytes(&bytes, 0).unwrap();
    assert_eq!(endpoint.proxies().len(), 2);
}
