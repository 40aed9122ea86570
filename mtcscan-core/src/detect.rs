use crate::diagnostics::{Diagnostics, Silent};
use crate::header::HEADER_SIZE;
use crate::key::resolve_key;
use crate::{HeaderLocator, ImageReader, ProtectedHeader, SignatureTable, VersionClassifier};

/// Outcome of running detection over one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Protected(ProtectedHeader),
    /// No search tier produced a classified header.
    NotDetected,
}

impl Detection {
    pub fn header(&self) -> Option<&ProtectedHeader> {
        match self {
            Detection::Protected(h) => Some(h),
            Detection::NotDetected => None,
        }
    }

    pub fn into_header(self) -> Option<ProtectedHeader> {
        match self {
            Detection::Protected(h) => Some(h),
            Detection::NotDetected => None,
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, Detection::Protected(_))
    }
}

/// Locates, classifies and resolves the key for a protected image.
///
/// A `Detector` only reads from the image, so running it repeatedly over the
/// same image always gives the same result.
pub struct Detector<'a> {
    table: &'a SignatureTable,
    locator: HeaderLocator,
    diagnostics: &'a dyn Diagnostics,
}

impl<'a> Detector<'a> {
    pub fn new(table: &'a SignatureTable) -> Self {
        static SILENT: Silent = Silent;
        Self {
            table,
            locator: HeaderLocator::default(),
            diagnostics: &SILENT,
        }
    }

    pub fn with_locator(mut self, locator: HeaderLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: &'a dyn Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn detect<R: ImageReader + ?Sized>(&self, image: &R) -> Detection {
        let classifier = VersionClassifier::with_diagnostics(self.table, self.diagnostics);
        let Some(found) = self.locator.locate(image, &classifier) else {
            return Detection::NotDetected;
        };

        let raw = match image.read_bytes(found.offset, HEADER_SIZE) {
            Ok(bytes) => match <[u8; HEADER_SIZE]>::try_from(bytes) {
                Ok(raw) => Box::new(raw),
                Err(_) => return Detection::NotDetected,
            },
            Err(e) => {
                self.diagnostics.emit(
                    log::Level::Warn,
                    format_args!(
                        "{} header at {:#x} is truncated: {}",
                        found.version, found.offset, e
                    ),
                );
                return Detection::NotDetected;
            }
        };

        let key = resolve_key(found.version, &raw[..], image, self.diagnostics);
        Detection::Protected(ProtectedHeader::new(found.version, found.offset, raw, key))
    }
}

impl std::fmt::Debug for Detector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("signatures", &self.table.len())
            .field("locator", &self.locator)
            .finish()
    }
}
