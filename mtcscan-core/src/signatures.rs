//! Fingerprint table mapping the two words at `+0x900`/`+0x904` of a control
//! header to a protector revision.
//!
//! The constants are reverse-engineered per revision and are supplied by the
//! caller, either as a `&'static` slice or as a JSON document:
//!
//! ```json
//! [
//!   { "magic_lo": "0x12345678", "magic_hi": 2271560481, "version": "V6" }
//! ]
//! ```

use crate::ProtectorVersion;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    #[serde(deserialize_with = "de_u32")]
    pub magic_lo: u32,
    #[serde(deserialize_with = "de_u32")]
    pub magic_hi: u32,
    pub version: ProtectorVersion,
}

impl SignatureEntry {
    pub const fn new(magic_lo: u32, magic_hi: u32, version: ProtectorVersion) -> Self {
        Self {
            magic_lo,
            magic_hi,
            version,
        }
    }
}

/// Ordered, immutable signature table. Lookup returns the first exact match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTable {
    entries: Cow<'static, [SignatureEntry]>,
}

impl SignatureTable {
    pub const fn from_static(entries: &'static [SignatureEntry]) -> Self {
        Self {
            entries: Cow::Borrowed(entries),
        }
    }

    pub fn new(entries: Vec<SignatureEntry>) -> Result<Self> {
        if let Some(bad) = entries.iter().position(|e| !e.version.is_known()) {
            bail!("signature entry {} maps to version Unknown", bad);
        }
        Ok(Self {
            entries: Cow::Owned(entries),
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let entries: Vec<SignatureEntry> =
            serde_json::from_str(text).context("malformed signature table")?;
        Self::new(entries)
    }

    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path).with_context(|| {
            format!("failed to read signature table {}", path.as_ref().display())
        })?;
        let table = Self::from_json(&text)?;
        log::info!(
            "Loaded {} signatures from {}",
            table.len(),
            path.as_ref().display()
        );
        Ok(table)
    }

    pub fn lookup(&self, magic_lo: u32, magic_hi: u32) -> ProtectorVersion {
        self.entries
            .iter()
            .find(|e| e.magic_lo == magic_lo && e.magic_hi == magic_hi)
            .map_or(ProtectorVersion::Unknown, |e| e.version)
    }

    pub fn entries(&self) -> &[SignatureEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn de_u32<'de, D: Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Text(String),
    }

    match Raw::deserialize(de)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed.map_err(|e| serde::de::Error::custom(format!("bad fingerprint {s:?}: {e}")))
        }
    }
}
