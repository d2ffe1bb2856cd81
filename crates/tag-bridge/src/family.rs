//! The closed set of marker families the external engine can construct.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A fixed visual encoding scheme for fiducial markers.
///
/// The set is closed: configuration requests arriving as strings are resolved
/// through [`FromStr`] and unknown names are rejected at the boundary, before
/// any engine resource is touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagFamily {
    Tag36h11,
    Tag36h10,
    Tag16h5,
    Tag25h9,
    Circle21h7,
    Custom48h12,
    Standard41h12,
    Circle49h12,
    Standard52h13,
}

impl TagFamily {
    pub const COUNT: usize = 9;

    /// Every supported family, in engine table order.
    pub const ALL: [TagFamily; Self::COUNT] = [
        TagFamily::Tag36h11,
        TagFamily::Tag36h10,
        TagFamily::Tag16h5,
        TagFamily::Tag25h9,
        TagFamily::Circle21h7,
        TagFamily::Custom48h12,
        TagFamily::Standard41h12,
        TagFamily::Circle49h12,
        TagFamily::Standard52h13,
    ];

    /// Position in [`TagFamily::ALL`]; used to index engine capability tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Boundary name, as accepted by the configuration entry point.
    pub fn as_str(self) -> &'static str {
        match self {
            TagFamily::Tag36h11 => "tag36h11",
            TagFamily::Tag36h10 => "tag36h10",
            TagFamily::Tag16h5 => "tag16h5",
            TagFamily::Tag25h9 => "tag25h9",
            TagFamily::Circle21h7 => "tag21h7",
            TagFamily::Custom48h12 => "tag48h12",
            TagFamily::Standard41h12 => "tag41h12",
            TagFamily::Circle49h12 => "tag49h12",
            TagFamily::Standard52h13 => "tag52h13",
        }
    }
}

impl fmt::Display for TagFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A family name outside the supported set.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown tag family \"{0}\"")]
pub struct UnknownFamily(pub String);

impl FromStr for TagFamily {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagFamily::ALL
            .iter()
            .copied()
            .find(|family| family.as_str() == s)
            .ok_or_else(|| UnknownFamily(s.to_owned()))
    }
}
