//! Links and their owners

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Identifier of the (anonymous) owner of links
///
/// Persisted as its decimal representation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Wrap a raw owner ID
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Create an owner ID from the bytes embedded in an identity token
    pub const fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.parse::<u64>().map(Self)
    }
}

/// A stored link
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    /// Short code, primary key
    pub code: String,

    /// Original URL, exactly as submitted
    pub url: String,

    /// The owner that created the link
    pub owner_id: OwnerId,

    /// Tombstone flag
    pub deleted: bool,
}

impl Link {
    /// Is the link soft-deleted?
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}
