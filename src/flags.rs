//! Engine call flags.
//!
//! Flags are a 64-bit set sent with every engine call. They select which
//! sections appear in returned JSON and whether mutations return an info
//! payload describing the entities they affected.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set of engine flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SzFlags(u64);

#[allow(missing_docs)]
impl SzFlags {
    pub const NONE: Self = Self(0);

    pub const ENTITY_INCLUDE_POSSIBLY_SAME_RELATIONS: Self = Self(1 << 6);
    pub const ENTITY_INCLUDE_POSSIBLY_RELATED_RELATIONS: Self = Self(1 << 7);
    pub const ENTITY_INCLUDE_NAME_ONLY_RELATIONS: Self = Self(1 << 8);
    pub const ENTITY_INCLUDE_DISCLOSED_RELATIONS: Self = Self(1 << 9);
    pub const ENTITY_INCLUDE_ALL_FEATURES: Self = Self(1 << 10);
    pub const ENTITY_INCLUDE_REPRESENTATIVE_FEATURES: Self = Self(1 << 11);
    pub const ENTITY_INCLUDE_ENTITY_NAME: Self = Self(1 << 12);
    pub const ENTITY_INCLUDE_RECORD_SUMMARY: Self = Self(1 << 13);
    pub const ENTITY_INCLUDE_RECORD_DATA: Self = Self(1 << 14);
    pub const ENTITY_INCLUDE_RECORD_MATCHING_INFO: Self = Self(1 << 15);
    pub const ENTITY_INCLUDE_RECORD_JSON_DATA: Self = Self(1 << 16);
    pub const ENTITY_INCLUDE_RELATED_ENTITY_NAME: Self = Self(1 << 19);
    pub const ENTITY_INCLUDE_RELATED_MATCHING_INFO: Self = Self(1 << 20);
    pub const ENTITY_INCLUDE_RELATED_RECORD_SUMMARY: Self = Self(1 << 21);

    pub const SEARCH_INCLUDE_RESOLVED: Self = Self(1 << 0);
    pub const SEARCH_INCLUDE_POSSIBLY_SAME: Self = Self(1 << 1);
    pub const SEARCH_INCLUDE_POSSIBLY_RELATED: Self = Self(1 << 2);
    pub const SEARCH_INCLUDE_NAME_ONLY: Self = Self(1 << 3);
    pub const SEARCH_INCLUDE_FEATURE_SCORES: Self = Self(1 << 26);
    pub const SEARCH_INCLUDE_STATS: Self = Self(1 << 27);

    /// Ask mutations to return an info payload.
    pub const WITH_INFO: Self = Self(1 << 62);

    pub const ENTITY_INCLUDE_ALL_RELATIONS: Self = Self(
        Self::ENTITY_INCLUDE_POSSIBLY_SAME_RELATIONS.0
            | Self::ENTITY_INCLUDE_POSSIBLY_RELATED_RELATIONS.0
            | Self::ENTITY_INCLUDE_NAME_ONLY_RELATIONS.0
            | Self::ENTITY_INCLUDE_DISCLOSED_RELATIONS.0,
    );

    pub const ENTITY_DEFAULT_FLAGS: Self = Self(
        Self::ENTITY_INCLUDE_ALL_RELATIONS.0
            | Self::ENTITY_INCLUDE_REPRESENTATIVE_FEATURES.0
            | Self::ENTITY_INCLUDE_ENTITY_NAME.0
            | Self::ENTITY_INCLUDE_RECORD_SUMMARY.0
            | Self::ENTITY_INCLUDE_RECORD_DATA.0
            | Self::ENTITY_INCLUDE_RECORD_MATCHING_INFO.0
            | Self::ENTITY_INCLUDE_RELATED_ENTITY_NAME.0
            | Self::ENTITY_INCLUDE_RELATED_RECORD_SUMMARY.0
            | Self::ENTITY_INCLUDE_RELATED_MATCHING_INFO.0,
    );

    pub const SEARCH_BY_ATTRIBUTES_ALL: Self = Self(
        Self::SEARCH_INCLUDE_RESOLVED.0
            | Self::SEARCH_INCLUDE_POSSIBLY_SAME.0
            | Self::SEARCH_INCLUDE_POSSIBLY_RELATED.0
            | Self::SEARCH_INCLUDE_NAME_ONLY.0
            | Self::ENTITY_INCLUDE_REPRESENTATIVE_FEATURES.0
            | Self::ENTITY_INCLUDE_ENTITY_NAME.0
            | Self::ENTITY_INCLUDE_RECORD_SUMMARY.0
            | Self::SEARCH_INCLUDE_FEATURE_SCORES.0,
    );

    pub const SEARCH_BY_ATTRIBUTES_DEFAULT_FLAGS: Self = Self::SEARCH_BY_ATTRIBUTES_ALL;

    /// Raw bit value.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Builds flags from a raw bit value.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Signed form used on the wire.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn to_wire(self) -> i64 {
        self.0 as i64
    }

    /// Inverse of [`SzFlags::to_wire`].
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn from_wire(raw: i64) -> Self {
        Self(raw as u64)
    }
}

impl BitOr for SzFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SzFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for SzFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
