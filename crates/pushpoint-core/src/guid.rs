//! Client identity: the 16-byte GUID every push endpoint is keyed on.

use std::fmt;
use std::str::FromStr;

use crate::wire::WireError;

/// Length of a client GUID on the wire.
pub const GUID_LEN: usize = 16;

/// Length of a client GUID in its hex text form.
pub const GUID_HEX_LEN: usize = GUID_LEN * 2;

/// Identity of a peer on the overlay.
///
/// Value semantics: two GUIDs are the same peer iff their bytes match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ClientGuid([u8; GUID_LEN]);

impl ClientGuid {
    pub const fn new(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, WireError> {
        let bytes: [u8; GUID_LEN] = bytes.try_into().map_err(|_| WireError::InvalidGuid)?;
        Ok(Self(bytes))
    }

    /// Parse the 32-digit hex form. Case-insensitive.
    pub fn from_hex(text: &str) -> Result<Self, WireError> {
        if text.len() != GUID_HEX_LEN {
            return Err(WireError::InvalidGuid);
        }
        let mut bytes = [0u8; GUID_LEN];
        hex::decode_to_slice(text, &mut bytes).map_err(|_| WireError::InvalidGuid)?;
        Ok(Self(bytes))
    }

    /// Upper-case hex, as written into HTTP headers.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; GUID_LEN] {
        &self.0
    }
}

impl From<[u8; GUID_LEN]> for ClientGuid {
    fn from(bytes: [u8; GUID_LEN]) -> Self {
        Self(bytes)
    }
}

impl FromStr for ClientGuid {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.trim())
    }
}

impl fmt::Display for ClientGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ClientGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientGuid({})", self.to_hex())
    }
}
