//! Variable names and keys.
//!
//! Names are stored as UCS-2 little-endian code units followed by a NUL
//! terminator. The terminator is counted in the on-media name size.

use std::fmt;

use uguid::Guid;

use crate::error::{FormatError, Result};

/// A variable name.
///
/// Holds the code units without the terminator. The empty name is used as
/// a wildcard when searching for the first entry of a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VariableName {
    units: Vec<u16>,
}

impl VariableName {
    /// Encode a name from a string.
    ///
    /// Rejects interior NULs and characters outside the basic multilingual
    /// plane, which UCS-2 cannot represent.
    pub fn new(name: &str) -> Result<Self> {
        let mut units = Vec::with_capacity(name.len());
        for c in name.chars() {
            if c == '\0' {
                return Err(FormatError::InvalidName(format!(
                    "interior NUL in {name:?}"
                )));
            }
            let mut buf = [0u16; 2];
            let encoded = c.encode_utf16(&mut buf);
            if encoded.len() != 1 {
                return Err(FormatError::InvalidName(format!(
                    "character {c:?} is outside UCS-2"
                )));
            }
            units.push(encoded[0]);
        }
        Ok(Self { units })
    }

    /// The empty (wildcard) name.
    pub const fn empty() -> Self {
        Self { units: Vec::new() }
    }

    /// Decode a name from its on-media bytes (terminator included).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 || bytes.len() % 2 != 0 {
            return Err(FormatError::InvalidName(format!(
                "name size {} is not a terminated UCS-2 string",
                bytes.len()
            )));
        }

        let mut units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        if units.pop() != Some(0) {
            return Err(FormatError::InvalidName("missing NUL terminator".to_string()));
        }
        if units.contains(&0) {
            return Err(FormatError::InvalidName("interior NUL".to_string()));
        }

        Ok(Self { units })
    }

    /// Encode to on-media bytes, terminator included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for unit in self.units.iter().chain(std::iter::once(&0)) {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    /// Size of the encoded name including the terminator.
    pub const fn encoded_len(&self) -> usize {
        (self.units.len() + 1) * 2
    }

    /// Whether this is the wildcard name.
    pub const fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Code units without the terminator.
    pub fn units(&self) -> &[u16] {
        &self.units
    }

    /// Compare against on-media name bytes without decoding them.
    pub fn matches_bytes(&self, bytes: &[u8]) -> bool {
        if bytes.len() != self.encoded_len() {
            return false;
        }
        self.units
            .iter()
            .chain(std::iter::once(&0))
            .zip(bytes.chunks_exact(2))
            .all(|(unit, pair)| unit.to_le_bytes() == [pair[0], pair[1]])
    }

    /// Check whether the name starts with `prefix`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix: Vec<u16> = prefix.encode_utf16().collect();
        self.units.starts_with(&prefix)
    }
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf16_lossy(&self.units))
    }
}

impl TryFrom<&str> for VariableName {
    type Error = FormatError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

/// Identity of a stored entry: vendor GUID plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableKey {
    /// Vendor namespace.
    pub vendor: Guid,
    /// Name within the vendor namespace.
    pub name: VariableName,
}

impl VariableKey {
    /// Create a key.
    pub const fn new(vendor: Guid, name: VariableName) -> Self {
        Self { vendor, name }
    }

    /// Shorthand for tests and tools.
    pub fn parse(vendor: Guid, name: &str) -> Result<Self> {
        Ok(Self::new(vendor, VariableName::new(name)?))
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.vendor)
    }
}
