use goblin::pe::section_table::SectionTable;

/// Name of the PE resource section.
pub const RESOURCE_SECTION: &str = ".rsrc";

/// A PE section, reduced to what the header search and RVA resolution need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub file_offset: u32,
    pub raw_size: u32,
    pub characteristics: u32,
}

impl Section {
    pub fn new(
        name: impl Into<String>,
        virtual_address: u32,
        file_offset: u32,
        raw_size: u32,
    ) -> Self {
        Self {
            name: name.into(),
            virtual_address,
            virtual_size: raw_size,
            file_offset,
            raw_size,
            characteristics: 0,
        }
    }

    pub fn from_goblin(sh: &SectionTable) -> Self {
        // Long names ("/4") are resolved by goblin into `real_name`.
        let name = match (&sh.real_name, sh.name()) {
            (Some(real), _) => real.clone(),
            (None, Ok(n)) => n.to_string(),
            (None, Err(_)) => String::from_utf8_lossy(&sh.name)
                .trim_end_matches('\0')
                .to_string(),
        };

        Section {
            name,
            virtual_address: sh.virtual_address,
            virtual_size: sh.virtual_size,
            file_offset: sh.pointer_to_raw_data,
            raw_size: sh.size_of_raw_data,
            characteristics: sh.characteristics,
        }
    }

    /// True if `rva` falls inside the mapped extent of this section.
    ///
    /// The extent is the larger of the virtual and raw sizes, since packers
    /// routinely leave one of the two at zero.
    pub fn contains_rva(&self, rva: u32) -> bool {
        let extent = self.virtual_size.max(self.raw_size) as u64;
        let start = self.virtual_address as u64;
        let rva = rva as u64;
        rva >= start && rva < start + extent
    }

    /// File offsets at which a `window`-byte block fits entirely inside the
    /// section's raw data. Empty when the section is smaller than the window.
    pub fn window_offsets(&self, window: u32) -> std::ops::Range<u64> {
        let start = self.file_offset as u64;
        match (self.raw_size as u64).checked_sub(window as u64) {
            Some(slack) => start..start + slack + 1,
            None => start..start,
        }
    }
}
