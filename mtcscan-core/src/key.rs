//! Unlock key recovery.
//!
//! Revisions up to V7 use a fixed key. V8 picks one of a handful of keys, and
//! the right one is recognised by XOR-ing the scrambled key-block RVA stored at
//! the end of the header and checking that the result is a page-aligned
//! address inside a real section.

use crate::diagnostics::Diagnostics;
use crate::header::{rva_at, KEY_RVA_OFFSET};
use crate::{ImageReader, ProtectorVersion};

pub const KEY_V1_V5: u32 = 0x07AB_F931;
pub const KEY_V6: u32 = 0x07AB_A931;
pub const KEY_V7: u32 = 0x08AB_A931;

/// Candidate keys for V8, tried in this order.
pub const V8_CANDIDATES: [u32; 3] = [0x99BA_9A13, 0x18AB_A931, 0x18AB_A933];

const PAGE_MASK: u32 = 0xFFF;

/// An unlock key and whether it passed the structural check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key: u32,
    /// False only when no V8 candidate produced a plausible key-block RVA; the
    /// key is then the last candidate tried.
    pub validated: bool,
}

impl ResolvedKey {
    const fn fixed(key: u32) -> Self {
        Self {
            key,
            validated: true,
        }
    }
}

/// True if `rva` is page aligned and lands inside a section of `image`.
pub fn is_plausible_rva<R: ImageReader + ?Sized>(image: &R, rva: u32) -> bool {
    rva & PAGE_MASK == 0 && image.find_section_by_rva(rva).is_some()
}

/// Determines the unlock key for a header of the given `version`.
pub fn resolve_key<R: ImageReader + ?Sized>(
    version: ProtectorVersion,
    header: &[u8],
    image: &R,
    diagnostics: &dyn Diagnostics,
) -> ResolvedKey {
    match version {
        ProtectorVersion::Unknown
        | ProtectorVersion::V1
        | ProtectorVersion::V2
        | ProtectorVersion::V3
        | ProtectorVersion::V4
        | ProtectorVersion::V5 => ResolvedKey::fixed(KEY_V1_V5),
        ProtectorVersion::V6 => ResolvedKey::fixed(KEY_V6),
        ProtectorVersion::V7 => ResolvedKey::fixed(KEY_V7),
        ProtectorVersion::V8 => resolve_v8(header, image, diagnostics),
    }
}

fn resolve_v8<R: ImageReader + ?Sized>(
    header: &[u8],
    image: &R,
    diagnostics: &dyn Diagnostics,
) -> ResolvedKey {
    for key in V8_CANDIDATES {
        let Some(rva) = rva_at(header, KEY_RVA_OFFSET, key) else {
            break;
        };
        let ok = is_plausible_rva(image, rva);
        diagnostics.emit(
            log::Level::Debug,
            format_args!(
                "V8 key {key:#010x}: key block rva {rva:#x} {}",
                if ok { "accepted" } else { "rejected" }
            ),
        );
        if ok {
            return ResolvedKey {
                key,
                validated: true,
            };
        }
    }

    let key = V8_CANDIDATES[V8_CANDIDATES.len() - 1];
    diagnostics.emit(
        log::Level::Warn,
        format_args!("No V8 key produced a valid key block rva; falling back to {key:#010x}"),
    );
    ResolvedKey {
        key,
        validated: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::testing::Recorder;
    use crate::diagnostics::Silent;
    use crate::{PeImage, Section};

    fn image() -> PeImage {
        PeImage::from_parts(
            vec![0u8; 0x100],
            vec![
                Section::new(".text", 0x1000, 0x0, 0x1000),
                Section::new(".data", 0x4000, 0x0, 0x2000),
            ],
        )
    }

    fn header_with_key_word(word: u32) -> Vec<u8> {
        let mut header = vec![0u8; 0x1000];
        header[0xFFC..].copy_from_slice(&word.to_le_bytes());
        header
    }

    #[test]
    fn fixed_keys() {
        let header = header_with_key_word(0);
        let img = image();
        for (version, key) in [
            (ProtectorVersion::V1, KEY_V1_V5),
            (ProtectorVersion::V3, KEY_V1_V5),
            (ProtectorVersion::V5, KEY_V1_V5),
            (ProtectorVersion::V6, KEY_V6),
            (ProtectorVersion::V7, KEY_V7),
        ] {
            assert_eq!(
                resolve_key(version, &header, &img, &Silent),
                ResolvedKey::fixed(key)
            );
        }
    }

    #[test]
    fn v8_first_candidate() {
        let header = header_with_key_word(0x4000 ^ V8_CANDIDATES[0]);
        let resolved = resolve_key(ProtectorVersion::V8, &header, &image(), &Silent);
        assert_eq!(resolved.key, 0x99BA_9A13);
        assert!(resolved.validated);
    }

    #[test]
    fn v8_only_second_candidate_validates() {
        let header = header_with_key_word(0x5000 ^ 0x18AB_A931);
        // The other candidates must yield implausible RVAs.
        for key in [V8_CANDIDATES[0], V8_CANDIDATES[2]] {
            assert!(!is_plausible_rva(&image(), (0x5000 ^ 0x18AB_A931) ^ key));
        }

        let resolved = resolve_key(ProtectorVersion::V8, &header, &image(), &Silent);
        assert_eq!(
            resolved,
            ResolvedKey {
                key: 0x18AB_A931,
                validated: true
            }
        );
    }

    #[test]
    fn v8_unaligned_rva_rejected() {
        // Lands in .text but is not page aligned under any candidate.
        let header = header_with_key_word(0x1010 ^ V8_CANDIDATES[0]);
        let resolved = resolve_key(ProtectorVersion::V8, &header, &image(), &Silent);
        assert!(!resolved.validated);
    }

    #[test]
    fn v8_fallthrough_keeps_last_candidate() {
        let header = header_with_key_word(0xFFFF_0000);
        let recorder = Recorder::default();
        let resolved = resolve_key(ProtectorVersion::V8, &header, &image(), &recorder);
        assert_eq!(resolved.key, 0x18AB_A933);
        assert!(!resolved.validated);

        let messages = recorder.messages.borrow();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].0, log::Level::Warn);
    }
}
