use crate::key::ResolvedKey;
use crate::ProtectorVersion;
use byteorder::{ByteOrder, LE};

/// Size of the protector's control header.
pub const HEADER_SIZE: usize = 0x1000;

/// Offset of the scrambled key-block RVA, the last word of the header.
pub const KEY_RVA_OFFSET: usize = 0xFFC;

/// Reads the little-endian word at `offset` of `header` and XORs it with `key`.
pub fn rva_at(header: &[u8], offset: usize, key: u32) -> Option<u32> {
    let bytes = header.get(offset..offset.checked_add(4)?)?;
    Some(LE::read_u32(bytes) ^ key)
}

/// A located, classified control header together with its unlock key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedHeader {
    version: ProtectorVersion,
    offset: u64,
    raw: Box<[u8; HEADER_SIZE]>,
    key: ResolvedKey,
}

impl ProtectedHeader {
    pub(crate) fn new(
        version: ProtectorVersion,
        offset: u64,
        raw: Box<[u8; HEADER_SIZE]>,
        key: ResolvedKey,
    ) -> Self {
        Self {
            version,
            offset,
            raw,
            key,
        }
    }

    pub fn version(&self) -> ProtectorVersion {
        self.version
    }

    /// File offset where the header starts.
    pub fn header_offset(&self) -> u64 {
        self.offset
    }

    pub fn raw(&self) -> &[u8; HEADER_SIZE] {
        &self.raw
    }

    pub fn unlock_key(&self) -> u32 {
        self.key.key
    }

    /// False when the key is a best-effort V8 guess that failed the
    /// structural check.
    pub fn key_validated(&self) -> bool {
        self.key.validated
    }

    /// Raw (still scrambled) word at `offset`. `None` past the header end.
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        rva_at(&self.raw[..], offset, 0)
    }

    pub fn rva_at(&self, offset: usize, key: u32) -> Option<u32> {
        rva_at(&self.raw[..], offset, key)
    }

    /// Word at `offset` de-scrambled with the unlock key.
    pub fn descramble(&self, offset: usize) -> Option<u32> {
        self.rva_at(offset, self.key.key)
    }

    /// RVA of the protector's key block.
    pub fn key_rva(&self) -> u32 {
        // KEY_RVA_OFFSET + 4 == HEADER_SIZE
        LE::read_u32(&self.raw[KEY_RVA_OFFSET..]) ^ self.key.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ProtectedHeader {
        let mut raw = Box::new([0u8; HEADER_SIZE]);
        raw[0x10..0x14].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        raw[KEY_RVA_OFFSET..].copy_from_slice(&(0x7000 ^ 0x18AB_A931u32).to_le_bytes());
        ProtectedHeader::new(
            ProtectorVersion::V8,
            0x400,
            raw,
            ResolvedKey {
                key: 0x18AB_A931,
                validated: true,
            },
        )
    }

    #[test]
    fn rva_at_is_xor_of_word() {
        let h = header();
        for key in [0u32, 1, 0x07AB_F931, 0xFFFF_FFFF] {
            let rva = h.rva_at(0x10, key).unwrap();
            assert_eq!(rva, 0x1234_5678 ^ key);
            assert_eq!(rva ^ key, h.read_u32(0x10).unwrap());
        }
    }

    #[test]
    fn key_rva_descrambles_last_word() {
        let h = header();
        assert_eq!(h.key_rva(), 0x7000);
        assert_eq!(h.descramble(KEY_RVA_OFFSET), Some(0x7000));
    }

    #[test]
    fn reads_past_end_are_none() {
        let h = header();
        assert_eq!(h.read_u32(0xFFD), None);
        assert_eq!(h.read_u32(usize::MAX), None);
        assert_eq!(rva_at(&[1, 2, 3], 0, 0), None);
    }
}
