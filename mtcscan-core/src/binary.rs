use crate::reader::{checked_range, ReadError};
use crate::{ImageReader, Section};
use anyhow::{Context, Result};
use byteorder::{ByteOrder, LE};
use goblin::pe::header::{Header, SIZEOF_COFF_HEADER, SIZEOF_PE_MAGIC};
use std::io::Read;

/// A PE file held in memory together with its parsed section table.
#[derive(Debug, Clone)]
pub struct PeImage {
    pub path: Option<String>,
    data: Vec<u8>,
    sections: Vec<Section>,
}

impl PeImage {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let mut file = std::fs::File::open(&path)
            .with_context(|| format!("failed to open {}", path.as_ref().display()))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let mut image = Self::parse(buf)?;
        image.path = Some(path.as_ref().display().to_string());
        Ok(image)
    }

    /// Parses only the PE headers and section table. Data directories are
    /// left alone, since protected images routinely carry bogus ones.
    pub fn parse(buf: Vec<u8>) -> Result<Self> {
        let header = Header::parse(&buf).context("not a PE image")?;
        let mut offset = header.dos_header.pe_pointer as usize
            + SIZEOF_PE_MAGIC
            + SIZEOF_COFF_HEADER
            + header.coff_header.size_of_optional_header as usize;
        let sections: Vec<Section> = header
            .coff_header
            .sections(&buf, &mut offset)
            .context("malformed section table")?
            .iter()
            .map(Section::from_goblin)
            .collect();

        log::info!("Parsed PE image with {} sections", sections.len());
        for s in &sections {
            if s.file_offset as u64 + s.raw_size as u64 > buf.len() as u64 {
                log::warn!(
                    "Section {} raw data runs past end of file ({:#x} + {:#x} > {:#x})",
                    s.name,
                    s.file_offset,
                    s.raw_size,
                    buf.len()
                );
            }
        }

        Ok(Self {
            path: None,
            data: buf,
            sections,
        })
    }

    /// Builds an image from raw bytes and an explicit section table, skipping
    /// header parsing entirely.
    pub fn from_parts(data: Vec<u8>, sections: Vec<Section>) -> Self {
        Self {
            path: None,
            data,
            sections,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl ImageReader for PeImage {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn read_bytes(&self, offset: u64, len: usize) -> Result<&[u8], ReadError> {
        let range = checked_range(offset, len, self.data.len())?;
        Ok(&self.data[range])
    }

    fn read_u32(&self, offset: u64) -> Result<u32, ReadError> {
        let range = checked_range(offset, 4, self.data.len())?;
        Ok(LE::read_u32(&self.data[range]))
    }

    fn sections(&self) -> &[Section] {
        &self.sections
    }
}
