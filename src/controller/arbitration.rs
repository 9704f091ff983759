//! Source ownership and latch rules for logical inputs
//!
//! Each logical input remembers the [`SourceId`] of its last accepted
//! writer. A different source may only take over with an active signal, so
//! an idle alternate device cannot release a button or recenter a stick that
//! another device is holding. With any number of competing sources the rule
//! is last-active-wins.

use tracing::trace;

use crate::input::source_id::SourceId;
use crate::input::status::{ButtonStatus, StickStatus, TriggerStatus};

/// Outcome of offering a new reading to a logical input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// Another source owns the input and the reading is idle
    Rejected,
    /// Accepted, logical value unchanged
    Unchanged,
    /// Accepted, logical value changed
    Changed,
}

/// Whether `incoming` may write an input currently owned by `owner`
pub fn accepts(owner: SourceId, incoming: SourceId, active: bool) -> bool {
    owner == incoming || active
}

/// Canonical value of one button
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonSlot {
    pub status: ButtonStatus,
    pub owner: SourceId,
}

impl ButtonSlot {
    /// Offer a button reading from `source`
    ///
    /// Without toggle the value mirrors the reading. With toggle a press
    /// while unlocked flips the value and locks; a release only unlocks.
    pub fn offer(&mut self, reading: ButtonStatus, source: SourceId) -> Update {
        if !accepts(self.owner, source, reading.value) {
            trace!("Button release from {} ignored, owned by {}", source, self.owner);
            return Update::Rejected;
        }

        let current = &mut self.status;
        current.toggle = reading.toggle;
        self.owner = source;

        if !current.toggle {
            current.locked = false;
            if current.value != reading.value {
                current.value = reading.value;
                return Update::Changed;
            }
            return Update::Unchanged;
        }

        if reading.value && !current.locked {
            current.locked = true;
            current.value = !current.value;
            return Update::Changed;
        }
        if !reading.value && current.locked {
            current.locked = false;
        }
        Update::Unchanged
    }
}

/// Canonical value of one stick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StickSlot {
    pub status: StickStatus,
    pub owner: SourceId,
}

impl StickSlot {
    /// Offer a stick reading; a foreign source needs a direction past threshold
    ///
    /// Sticks have no "unchanged" outcome: every accepted reading is stored
    /// and reported.
    pub fn offer(&mut self, reading: StickStatus, source: SourceId) -> Update {
        if !accepts(self.owner, source, reading.any_direction()) {
            trace!("Idle stick from {} ignored, owned by {}", source, self.owner);
            return Update::Rejected;
        }
        self.status = reading;
        self.owner = source;
        Update::Changed
    }
}

/// Canonical value of one analog trigger
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TriggerSlot {
    pub status: TriggerStatus,
    pub owner: SourceId,
}

impl TriggerSlot {
    /// Offer a trigger reading; a foreign source needs the trigger pressed
    pub fn offer(&mut self, reading: TriggerStatus, source: SourceId) -> Update {
        if !accepts(self.owner, source, reading.pressed.value) {
            trace!("Released trigger from {} ignored, owned by {}", source, self.owner);
            return Update::Rejected;
        }
        self.status = reading;
        self.owner = source;
        Update::Changed
    }
}
