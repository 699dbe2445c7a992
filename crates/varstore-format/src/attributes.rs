//! Entry attribute flags

use binrw::{BinRead, BinWrite};
use std::fmt;
use std::str::FromStr;

use crate::error::FormatError;

/// Attribute bits stored with every entry
///
/// Controls persistence (which region holds the entry), visibility per
/// phase and the size class.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[brw(little)]
pub struct Attributes {
    /// Raw flag value
    pub value: u32,
}

impl Attributes {
    /// No flags
    pub const NONE: u32 = 0x0000_0000;

    /// Entry persists across reboots (bit 0)
    pub const NON_VOLATILE: u32 = 0x0001;

    /// Entry is visible during boot (bit 1)
    pub const BOOTSERVICE_ACCESS: u32 = 0x0002;

    /// Entry is visible after the runtime transition (bit 2)
    pub const RUNTIME_ACCESS: u32 = 0x0004;

    /// Entry belongs to the hardware error record class (bit 3)
    pub const HARDWARE_ERROR_RECORD: u32 = 0x0008;

    /// Every bit this store understands
    pub const KNOWN: u32 = Self::NON_VOLATILE
        | Self::BOOTSERVICE_ACCESS
        | Self::RUNTIME_ACCESS
        | Self::HARDWARE_ERROR_RECORD;

    /// Create attributes from a raw value
    pub const fn new(value: u32) -> Self {
        Self { value }
    }

    /// `NV|BS|RT`, the usual combination for persistent settings
    pub const fn nv_bs_rt() -> Self {
        Self::new(Self::NON_VOLATILE | Self::BOOTSERVICE_ACCESS | Self::RUNTIME_ACCESS)
    }

    /// Check if all bits of `flag` are set
    pub const fn has(&self, flag: u32) -> bool {
        (self.value & flag) == flag
    }

    /// Set flag
    pub fn set(&mut self, flag: u32) {
        self.value |= flag;
    }

    /// Clear flag
    pub fn clear(&mut self, flag: u32) {
        self.value &= !flag;
    }

    /// Entry lives in the non-volatile region
    pub const fn is_non_volatile(&self) -> bool {
        self.has(Self::NON_VOLATILE)
    }

    /// Entry is readable after the runtime transition
    pub const fn is_runtime(&self) -> bool {
        self.has(Self::RUNTIME_ACCESS)
    }

    /// Entry uses the larger hardware error record limits
    pub const fn is_hw_error_record(&self) -> bool {
        self.has(Self::HARDWARE_ERROR_RECORD)
    }

    /// Entry is visible in at least one phase
    ///
    /// Setting an entry with no access bits deletes it.
    pub const fn grants_access(&self) -> bool {
        self.value & (Self::BOOTSERVICE_ACCESS | Self::RUNTIME_ACCESS) != 0
    }

    /// Runtime access without boot access is not a valid combination
    pub const fn is_runtime_without_boot(&self) -> bool {
        self.value & (Self::BOOTSERVICE_ACCESS | Self::RUNTIME_ACCESS) == Self::RUNTIME_ACCESS
    }
}

impl From<u32> for Attributes {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.has(Self::NON_VOLATILE) {
            names.push("NV");
        }
        if self.has(Self::BOOTSERVICE_ACCESS) {
            names.push("BS");
        }
        if self.has(Self::RUNTIME_ACCESS) {
            names.push("RT");
        }
        if self.has(Self::HARDWARE_ERROR_RECORD) {
            names.push("HR");
        }

        let unknown = self.value & !Self::KNOWN;
        if names.is_empty() && unknown == 0 {
            return write!(f, "NONE");
        }
        write!(f, "{}", names.join("|"))?;
        if unknown != 0 {
            if !names.is_empty() {
                write!(f, "|")?;
            }
            write!(f, "0x{unknown:x}")?;
        }
        Ok(())
    }
}

impl FromStr for Attributes {
    type Err = FormatError;

    /// Parse `nv,bs,rt` style lists (`|` also accepted as separator).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut attrs = Self::default();
        for token in s.split([',', '|']).map(str::trim).filter(|t| !t.is_empty()) {
            let flag = match token.to_ascii_lowercase().as_str() {
                "nv" | "non-volatile" | "non_volatile" => Self::NON_VOLATILE,
                "bs" | "boot" | "bootservice" => Self::BOOTSERVICE_ACCESS,
                "rt" | "runtime" => Self::RUNTIME_ACCESS,
                "hr" | "hwerr" | "hardware-error" => Self::HARDWARE_ERROR_RECORD,
                "none" => Self::NONE,
                other => match other.strip_prefix("0x") {
                    Some(hex) => u32::from_str_radix(hex, 16)
                        .map_err(|_| FormatError::InvalidAttribute(token.to_string()))?,
                    None => return Err(FormatError::InvalidAttribute(token.to_string())),
                },
            };
            attrs.set(flag);
        }
        Ok(attrs)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_attribute_predicates() {
        let attrs = Attributes::nv_bs_rt();
        assert!(attrs.is_non_volatile());
        assert!(attrs.is_runtime());
        assert!(attrs.grants_access());
        assert!(!attrs.is_hw_error_record());
        assert!(!attrs.is_runtime_without_boot());

        let rt_only = Attributes::new(Attributes::RUNTIME_ACCESS);
        assert!(rt_only.is_runtime_without_boot());

        let nv_only = Attributes::new(Attributes::NON_VOLATILE);
        assert!(!nv_only.grants_access());
    }

    #[test]
    fn test_parse_and_display() {
        let attrs: Attributes = "nv,bs,rt".parse().expect("parse");
        assert_eq!(attrs, Attributes::nv_bs_rt());
        assert_eq!(attrs.to_string(), "NV|BS|RT");

        let attrs: Attributes = "BS | HR".parse().expect("parse");
        assert_eq!(
            attrs.value,
            Attributes::BOOTSERVICE_ACCESS | Attributes::HARDWARE_ERROR_RECORD
        );

        assert_eq!(Attributes::default().to_string(), "NONE");
        assert_eq!(Attributes::new(0x41).to_string(), "NV|0x40");
        assert!("bogus".parse::<Attributes>().is_err());
    }

    #[test]
    fn test_binary_layout() {
        let attrs = Attributes::nv_bs_rt();
        let mut buf = Vec::new();
        attrs.write_le(&mut Cursor::new(&mut buf)).expect("write");
        assert_eq!(buf, vec![0x07, 0x00, 0x00, 0x00]);

        let parsed = Attributes::read_le(&mut Cursor::new(&buf)).expect("read");
        assert_eq!(parsed, attrs);
    }
}
