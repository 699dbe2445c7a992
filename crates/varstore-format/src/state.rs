//! Entry state lattice.
//!
//! The state byte lives on media that can only clear bits without a full
//! erase, so every transition is a bitwise AND with a mask:
//!
//! | State        | Mask   | Canonical byte |
//! |--------------|--------|----------------|
//! | Erased       | `0xFF` | `0xFF`         |
//! | Added        | `0x7F` | `0x7F`         |
//! | InTransition | `0xFE` | `0x7E`         |
//! | Deleted      | `0xFD` | `0x7C`/`0x7D`  |
//!
//! A deleted entry may carry either `0x7C` (deleted after a transition) or
//! `0x7D` (deleted directly from Added); both decode to [`EntryState::Deleted`].

use crate::error::{FormatError, Result};

/// Raw value of an erased state byte.
pub const STATE_ERASED: u8 = 0xFF;

/// Mask applied when an entry becomes valid.
pub const VAR_ADDED: u8 = 0x7F;

/// Mask applied when an entry starts being replaced or deleted.
pub const VAR_IN_DELETED_TRANSITION: u8 = 0xFE;

/// Mask applied when an entry is finally deleted.
pub const VAR_DELETED: u8 = 0xFD;

/// Position of an entry on the state lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryState {
    /// Header written but never committed.
    Erased,
    /// Live entry.
    Added,
    /// Live entry that is being superseded or deleted.
    InTransition,
    /// Dead entry, reclaimable.
    Deleted,
}

impl EntryState {
    /// Decode a raw state byte.
    pub const fn from_byte(raw: u8) -> Self {
        if raw & !VAR_ADDED != 0 {
            Self::Erased
        } else if raw & !VAR_DELETED == 0 {
            Self::Deleted
        } else if raw & !VAR_IN_DELETED_TRANSITION == 0 {
            Self::InTransition
        } else {
            Self::Added
        }
    }

    /// Canonical byte for a freshly written entry in this state.
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Erased => STATE_ERASED,
            Self::Added => VAR_ADDED,
            Self::InTransition => VAR_ADDED & VAR_IN_DELETED_TRANSITION,
            Self::Deleted => VAR_ADDED & VAR_IN_DELETED_TRANSITION & VAR_DELETED,
        }
    }

    const fn mask(self) -> u8 {
        match self {
            Self::Erased => STATE_ERASED,
            Self::Added => VAR_ADDED,
            Self::InTransition => VAR_IN_DELETED_TRANSITION,
            Self::Deleted => VAR_DELETED,
        }
    }

    /// Whether the entry still holds a readable value.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Added | Self::InTransition)
    }

    /// Check whether `self -> to` is allowed.
    ///
    /// Staying in the same state is always allowed.
    pub const fn can_narrow_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Erased, Self::Erased | Self::Added)
                | (Self::Added, Self::Added | Self::InTransition | Self::Deleted)
                | (Self::InTransition, Self::InTransition | Self::Deleted)
                | (Self::Deleted, Self::Deleted)
        )
    }

    /// Apply a transition to a raw state byte.
    ///
    /// The result only ever has a subset of the bits of `raw`.
    pub fn narrow(raw: u8, to: Self) -> Result<u8> {
        let from = Self::from_byte(raw);
        if !from.can_narrow_to(to) {
            return Err(FormatError::StateWidening { from, to });
        }
        Ok(raw & to.mask())
    }
}
