use crate::Section;
use thiserror::Error;

/// Failure of a bounds-checked read against the file image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("read of {len} bytes at offset {offset:#x} exceeds image size {size:#x}")]
    OutOfBounds { offset: u64, len: usize, size: usize },
}

/// Random-access view over a file image plus its section table.
///
/// Offsets are file offsets, never RVAs.
pub trait ImageReader {
    /// Total size of the image in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `len` bytes starting at `offset`.
    fn read_bytes(&self, offset: u64, len: usize) -> Result<&[u8], ReadError>;

    /// Reads a little-endian u32 at `offset`.
    fn read_u32(&self, offset: u64) -> Result<u32, ReadError>;

    /// Sections in file order.
    fn sections(&self) -> &[Section];

    fn find_section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections().iter().find(|s| s.name == name)
    }

    fn find_section_by_rva(&self, rva: u32) -> Option<&Section> {
        self.sections().iter().find(|s| s.contains_rva(rva))
    }
}

/// Bounds check shared by reader implementations; returns the byte range.
pub(crate) fn checked_range(
    offset: u64,
    len: usize,
    size: usize,
) -> Result<std::ops::Range<usize>, ReadError> {
    let err = ReadError::OutOfBounds { offset, len, size };
    let start = usize::try_from(offset).map_err(|_| err)?;
    let end = start.checked_add(len).ok_or(err)?;
    if end > size {
        return Err(err);
    }
    Ok(start..end)
}
