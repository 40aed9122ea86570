use serde::{Deserialize, Serialize};
use std::fmt;

/// Protector revision, ordered by revision number.
///
/// `Unknown` is the negative classification result. Revisions V1 through V5
/// share a single unlock key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtectorVersion {
    Unknown,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
}

impl ProtectorVersion {
    pub const ALL: [ProtectorVersion; 8] = [
        ProtectorVersion::V1,
        ProtectorVersion::V2,
        ProtectorVersion::V3,
        ProtectorVersion::V4,
        ProtectorVersion::V5,
        ProtectorVersion::V6,
        ProtectorVersion::V7,
        ProtectorVersion::V8,
    ];

    pub fn is_known(self) -> bool {
        self != ProtectorVersion::Unknown
    }
}

impl std::str::FromStr for ProtectorVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(ProtectorVersion::Unknown),
            "v1" => Ok(ProtectorVersion::V1),
            "v2" => Ok(ProtectorVersion::V2),
            "v3" => Ok(ProtectorVersion::V3),
            "v4" => Ok(ProtectorVersion::V4),
            "v5" => Ok(ProtectorVersion::V5),
            "v6" => Ok(ProtectorVersion::V6),
            "v7" => Ok(ProtectorVersion::V7),
            "v8" => Ok(ProtectorVersion::V8),
            _ => Err(format!("Unknown protector version: {}", s)),
        }
    }
}

impl fmt::Display for ProtectorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtectorVersion::Unknown => "Unknown",
            ProtectorVersion::V1 => "V1",
            ProtectorVersion::V2 => "V2",
            ProtectorVersion::V3 => "V3",
            ProtectorVersion::V4 => "V4",
            ProtectorVersion::V5 => "V5",
            ProtectorVersion::V6 => "V6",
            ProtectorVersion::V7 => "V7",
            ProtectorVersion::V8 => "V8",
        };
        write!(f, "{}", name)
    }
}
