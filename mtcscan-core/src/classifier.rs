use crate::diagnostics::{Diagnostics, Silent};
use crate::{ImageReader, ProtectorVersion, SignatureTable};

/// Offset of the low fingerprint word inside a control header.
pub const MAGIC_LO_OFFSET: u64 = 0x900;
/// Offset of the high fingerprint word inside a control header.
pub const MAGIC_HI_OFFSET: u64 = 0x904;

static SILENT: Silent = Silent;

/// Matches the fingerprint pair of a candidate header against a signature table.
#[derive(Clone, Copy)]
pub struct VersionClassifier<'a> {
    table: &'a SignatureTable,
    diagnostics: &'a dyn Diagnostics,
}

impl<'a> VersionClassifier<'a> {
    pub fn new(table: &'a SignatureTable) -> Self {
        Self {
            table,
            diagnostics: &SILENT,
        }
    }

    pub fn with_diagnostics(table: &'a SignatureTable, diagnostics: &'a dyn Diagnostics) -> Self {
        Self { table, diagnostics }
    }

    pub fn table(&self) -> &'a SignatureTable {
        self.table
    }

    pub fn diagnostics(&self) -> &'a dyn Diagnostics {
        self.diagnostics
    }

    /// Classifies the header candidate starting at file offset `offset`.
    ///
    /// Any read failure is reported as `Unknown`.
    pub fn classify<R: ImageReader + ?Sized>(&self, image: &R, offset: u64) -> ProtectorVersion {
        let (Some(lo_at), Some(hi_at)) = (
            offset.checked_add(MAGIC_LO_OFFSET),
            offset.checked_add(MAGIC_HI_OFFSET),
        ) else {
            return ProtectorVersion::Unknown;
        };
        let (Ok(magic_lo), Ok(magic_hi)) = (image.read_u32(lo_at), image.read_u32(hi_at)) else {
            return ProtectorVersion::Unknown;
        };

        let version = self.table.lookup(magic_lo, magic_hi);
        if version.is_known() {
            self.diagnostics.emit(
                log::Level::Debug,
                format_args!(
                    "Header candidate at {offset:#x}: \
                     magic_lo={magic_lo:#010x} magic_hi={magic_hi:#010x} -> {version}"
                ),
            );
        }
        version
    }
}

impl std::fmt::Debug for VersionClassifier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionClassifier")
            .field("signatures", &self.table.len())
            .finish()
    }
}
