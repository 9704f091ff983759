//! Style negotiation against the service's capability set

use super::types::{NpadStyleIndex, NpadStyleTag};

/// What a capability update requires of a connected controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// Current style still allowed
    Keep,
    /// Disconnect, switch to Pro controller, reconnect
    FallbackToPro,
    /// Disconnect and stay disconnected
    Unsupported,
}

/// Decide how a connected controller of `style` reacts to `supported`
pub fn negotiate(style: NpadStyleIndex, supported: NpadStyleTag) -> Negotiation {
    if supported.supports(style) {
        Negotiation::Keep
    } else if style.is_fullkey_family() && supported.contains(NpadStyleTag::FULLKEY) {
        Negotiation::FallbackToPro
    } else {
        Negotiation::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate() {
        let fullkey_only = NpadStyleTag::from_raw(NpadStyleTag::FULLKEY);
        assert_eq!(negotiate(NpadStyleIndex::ProController, fullkey_only), Negotiation::Keep);
        assert_eq!(negotiate(NpadStyleIndex::N64, fullkey_only), Negotiation::FallbackToPro);
        assert_eq!(negotiate(NpadStyleIndex::JoyconLeft, fullkey_only), Negotiation::Unsupported);

        let handheld_only = NpadStyleTag::from_raw(NpadStyleTag::HANDHELD);
        assert_eq!(negotiate(NpadStyleIndex::GameCube, handheld_only), Negotiation::Unsupported);
    }
}
