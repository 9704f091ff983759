//! Physical source identification
//!
//! Every raw callback is tagged with the [`SourceId`] of the physical device
//! that produced it. Logical inputs remember the identity of their last
//! accepted writer so that an idle alternate source cannot reset an input
//! another source is actively holding.

use std::fmt;

use tracing::debug;

/// Identity of the physical device instance feeding a logical input
///
/// Parsed from the `guid` field of a parameter descriptor. Descriptors without
/// a usable guid map to [`SourceId::NONE`], so all of them share one identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u128);

impl SourceId {
    /// Identity of sources that carry no guid
    pub const NONE: SourceId = SourceId(0);

    /// Shared identity of all TAS playback bindings
    pub const TAS: SourceId = SourceId::from_parts(0x0, 0x7A5);

    /// Build an identity from its high and low halves
    pub const fn from_parts(high: u64, low: u64) -> Self {
        Self(((high as u128) << 64) | low as u128)
    }

    /// Parse a guid string (hex digits, dashes ignored)
    ///
    /// Returns [`SourceId::NONE`] for empty or malformed input.
    pub fn from_guid(guid: &str) -> Self {
        let hex: String = guid.chars().filter(|c| *c != '-').collect();
        if hex.is_empty() {
            return Self::NONE;
        }
        if hex.len() > 32 {
            debug!("Guid too long, treating as anonymous source: {}", guid);
            return Self::NONE;
        }
        match u128::from_str_radix(&hex, 16) {
            Ok(value) => Self(value),
            Err(_) => {
                debug!("Guid is not hexadecimal, treating as anonymous source: {}", guid);
                Self::NONE
            }
        }
    }

    /// Whether this is the anonymous identity
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_guid() {
        let id = SourceId::from_guid("0300000000000000000000000000000a");
        assert_eq!(id.to_string(), "0300000000000000000000000000000a");
        assert!(!id.is_none());
    }

    #[test]
    fn test_dashes_are_ignored() {
        let plain = SourceId::from_guid("030000005e0400008e02000000000000");
        let dashed = SourceId::from_guid("03000000-5e04-0000-8e02-000000000000");
        assert_eq!(plain, dashed);
    }

    #[test]
    fn test_malformed_guid_is_anonymous() {
        assert!(SourceId::from_guid("").is_none());
        assert!(SourceId::from_guid("not-a-guid").is_none());
        assert!(SourceId::from_guid(&"f".repeat(40)).is_none());
    }

    #[test]
    fn test_tas_identity() {
        assert_eq!(SourceId::TAS, SourceId::from_parts(0, 0x7a5));
        assert_eq!(SourceId::TAS.to_string(), format!("{:032x}", 0x7a5));
    }
}
