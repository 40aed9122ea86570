//! Search for the protector's control header.
//!
//! The header is not aligned to anything inside its host section, so every
//! byte offset at which a full header would fit is a candidate. Tiers are
//! tried in order and the first classified candidate wins.

use crate::classifier::{VersionClassifier, MAGIC_HI_OFFSET};
use crate::header::HEADER_SIZE;
use crate::sections::RESOURCE_SECTION;
use crate::{ImageReader, ProtectorVersion, Section};
use std::fmt;

/// Where a control header was found and what it classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLocation {
    pub offset: u64,
    pub version: ProtectorVersion,
}

/// One strategy in the fallback search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTier {
    /// Only file offset 0.
    FileStart,
    /// Byte-granular scan of the first section with this name.
    NamedSection(String),
    /// Byte-granular scan of every section, in file order.
    AllSections,
}

impl SearchTier {
    fn search<R: ImageReader + ?Sized>(
        &self,
        image: &R,
        classifier: &VersionClassifier<'_>,
    ) -> Option<HeaderLocation> {
        match self {
            SearchTier::FileStart => {
                let version = classifier.classify(image, 0);
                version
                    .is_known()
                    .then_some(HeaderLocation { offset: 0, version })
            }
            SearchTier::NamedSection(name) => match image.find_section_by_name(name) {
                Some(section) => scan_section(image, section, classifier),
                None => {
                    classifier.diagnostics().emit(
                        log::Level::Debug,
                        format_args!("No {name} section; skipping"),
                    );
                    None
                }
            },
            SearchTier::AllSections => image
                .sections()
                .iter()
                .find_map(|section| scan_section(image, section, classifier)),
        }
    }
}

impl fmt::Display for SearchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchTier::FileStart => write!(f, "file start"),
            SearchTier::NamedSection(name) => write!(f, "section {}", name),
            SearchTier::AllSections => write!(f, "all sections"),
        }
    }
}

/// Scans every offset at which a full header fits inside `section`.
fn scan_section<R: ImageReader + ?Sized>(
    image: &R,
    section: &Section,
    classifier: &VersionClassifier<'_>,
) -> Option<HeaderLocation> {
    let offsets = section.window_offsets(HEADER_SIZE as u32);
    // Past this point the fingerprint reads can only fail.
    let readable = (image.len() as u64).saturating_sub(MAGIC_HI_OFFSET + 4);

    for offset in offsets {
        if offset > readable {
            break;
        }
        let version = classifier.classify(image, offset);
        if version.is_known() {
            return Some(HeaderLocation { offset, version });
        }
    }
    None
}

/// Ordered fallback search over a list of [`SearchTier`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLocator {
    tiers: Vec<SearchTier>,
}

impl Default for HeaderLocator {
    fn default() -> Self {
        Self::new(vec![
            SearchTier::FileStart,
            SearchTier::NamedSection(RESOURCE_SECTION.to_string()),
            SearchTier::AllSections,
        ])
    }
}

impl HeaderLocator {
    pub fn new(tiers: Vec<SearchTier>) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &[SearchTier] {
        &self.tiers
    }

    /// Runs the tiers in order, stopping at the first classified header.
    pub fn locate<R: ImageReader + ?Sized>(
        &self,
        image: &R,
        classifier: &VersionClassifier<'_>,
    ) -> Option<HeaderLocation> {
        self.tiers.iter().find_map(|tier| {
            let found = tier.search(image, classifier)?;
            classifier.diagnostics().emit(
                log::Level::Debug,
                format_args!(
                    "Located {} header at {:#x} via {}",
                    found.version, found.offset, tier
                ),
            );
            Some(found)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ReadError;
    use crate::{PeImage, SignatureEntry, SignatureTable};
    use std::cell::Cell;

    const LO: u32 = 0x5EED_0001;
    const HI: u32 = 0x5EED_0002;

    static TABLE: &[SignatureEntry] = &[SignatureEntry::new(LO, HI, ProtectorVersion::V7)];

    fn plant(data: &mut [u8], at: usize) {
        data[at + 0x900..at + 0x904].copy_from_slice(&LO.to_le_bytes());
        data[at + 0x904..at + 0x908].copy_from_slice(&HI.to_le_bytes());
    }

    /// Wraps an image and counts how often sections are consulted.
    struct Counting {
        inner: PeImage,
        section_queries: Cell<usize>,
        word_reads: Cell<usize>,
    }

    impl Counting {
        fn new(inner: PeImage) -> Self {
            Self {
                inner,
                section_queries: Cell::new(0),
                word_reads: Cell::new(0),
            }
        }
    }

    impl ImageReader for Counting {
        fn len(&self) -> usize {
            self.inner.len()
        }

        fn read_bytes(&self, offset: u64, len: usize) -> Result<&[u8], ReadError> {
            self.inner.read_bytes(offset, len)
        }

        fn read_u32(&self, offset: u64) -> Result<u32, ReadError> {
            self.word_reads.set(self.word_reads.get() + 1);
            self.inner.read_u32(offset)
        }

        fn sections(&self) -> &[Section] {
            self.section_queries.set(self.section_queries.get() + 1);
            self.inner.sections()
        }

        fn find_section_by_name(&self, name: &str) -> Option<&Section> {
            self.section_queries.set(self.section_queries.get() + 1);
            self.inner.find_section_by_name(name)
        }
    }

    #[test]
    fn file_start_short_circuits() {
        let mut data = vec![0u8; 0x4000];
        plant(&mut data, 0);
        let image = Counting::new(PeImage::from_parts(
            data,
            vec![Section::new(".rsrc", 0x1000, 0x1000, 0x3000)],
        ));
        let table = SignatureTable::from_static(TABLE);
        let classifier = VersionClassifier::new(&table);

        let found = HeaderLocator::default().locate(&image, &classifier).unwrap();
        assert_eq!(found.offset, 0);
        assert_eq!(found.version, ProtectorVersion::V7);
        assert_eq!(image.section_queries.get(), 0);
        assert_eq!(image.word_reads.get(), 2);
    }

    #[test]
    fn finds_unaligned_header_in_resources() {
        let start = 0x400usize;
        let k = 0x123usize;
        let mut data = vec![0u8; start + 0x1000 + k + 0x80];
        plant(&mut data, start + k);
        let image = PeImage::from_parts(
            data,
            vec![
                Section::new(".text", 0x1000, 0, start as u32),
                Section::new(".rsrc", 0x2000, start as u32, (0x1000 + k + 0x80) as u32),
            ],
        );
        let table = SignatureTable::from_static(TABLE);

        let found = HeaderLocator::default()
            .locate(&image, &VersionClassifier::new(&table))
            .unwrap();
        assert_eq!(found.offset, (start + k) as u64);
    }

    #[test]
    fn header_ending_at_section_end_is_found() {
        let start = 0x200usize;
        let k = 0x40usize;
        let mut data = vec![0u8; start + 0x1000 + k];
        plant(&mut data, start + k);
        let image = PeImage::from_parts(
            data,
            vec![Section::new(".rsrc", 0x2000, start as u32, (0x1000 + k) as u32)],
        );
        let table = SignatureTable::from_static(TABLE);

        let found = HeaderLocator::default()
            .locate(&image, &VersionClassifier::new(&table))
            .unwrap();
        assert_eq!(found.offset, (start + k) as u64);
    }

    #[test]
    fn falls_back_to_other_sections() {
        let mut data = vec![0u8; 0x3000];
        plant(&mut data, 0x1801);
        let image = PeImage::from_parts(
            data,
            vec![
                Section::new(".text", 0x1000, 0x0, 0x1000),
                Section::new(".data", 0x2000, 0x1000, 0x2000),
            ],
        );
        let table = SignatureTable::from_static(TABLE);

        let found = HeaderLocator::default()
            .locate(&image, &VersionClassifier::new(&table))
            .unwrap();
        assert_eq!(found.offset, 0x1801);
    }

    #[test]
    fn nothing_found_in_small_or_truncated_sections() {
        let image = PeImage::from_parts(
            vec![0u8; 0x1800],
            vec![
                Section::new(".tiny", 0x1000, 0x0, 0x800),
                Section::new(".rsrc", 0x2000, 0x800, 0x10_0000),
            ],
        );
        let table = SignatureTable::from_static(TABLE);

        assert_eq!(
            HeaderLocator::default().locate(&image, &VersionClassifier::new(&table)),
            None
        );
    }

    #[test]
    fn custom_tiers_are_respected() {
        let mut data = vec![0u8; 0x2000];
        plant(&mut data, 0);
        let image = PeImage::from_parts(data, vec![Section::new(".text", 0x1000, 0, 0x2000)]);
        let table = SignatureTable::from_static(TABLE);

        let locator = HeaderLocator::new(vec![SearchTier::NamedSection(".rsrc".into())]);
        assert_eq!(locator.locate(&image, &VersionClassifier::new(&table)), None);
    }
}
