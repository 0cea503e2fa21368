//! Mutable ELF64 image with an index of every parsed header location.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::constants::*;
use crate::field::{self, Encoding, FieldWidth, HeaderField};
use crate::header::{FileHeader, ProgramHeader, SectionHeader};
use crate::{ElfError, Result};

/// Shape of the section header table as described by the file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionHeaderState {
    /// `e_shoff`, `e_shentsize`, `e_shnum` and `e_shstrndx` are all zero.
    Absent,
    /// Non-zero offset, 64-byte entries, at least one entry, valid string
    /// table index.
    Standard,
    /// Anything else. Sections are not indexed in this state.
    Nonstandard,
}

impl SectionHeaderState {
    #[must_use]
    pub const fn classify(header: &FileHeader) -> Self {
        if header.shoff == 0 && header.shentsize == 0 && header.shnum == 0 && header.shstrndx == 0 {
            Self::Absent
        } else if header.shoff != 0
            && header.shentsize as usize == SHDR_SIZE
            && header.shnum > 0
            && header.shstrndx < header.shnum
        {
            Self::Standard
        } else {
            Self::Nonstandard
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Absent => "headers-absent",
            Self::Standard => "headers-present-standard",
            Self::Nonstandard => "headers-present-nonstandard",
        }
    }
}

impl std::fmt::Display for SectionHeaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A program header and where its record lives in the file.
#[derive(Clone, Debug)]
pub struct IndexedSegment {
    pub index: usize,
    /// File offset of the program header record.
    pub location: usize,
    pub header: ProgramHeader,
}

/// A section header, its resolved name, and where its record lives.
#[derive(Clone, Debug)]
pub struct IndexedSection {
    pub index: usize,
    /// File offset of the section header record.
    pub location: usize,
    pub name: String,
    pub header: SectionHeader,
}

impl IndexedSection {
    /// File offset of this record's `sh_offset` field.
    #[must_use]
    pub const fn offset_field(&self) -> usize {
        self.location + SH_OFFSET_FIELD
    }
}

/// In-memory ELF64 file.
///
/// The header index is built once per parse. Mutations go through
/// [`ImageEdit`], which works on a copy of the bytes and re-parses on
/// [`ImageEdit::finish`], so an image is never observed half-mutated.
#[derive(Clone, Debug)]
pub struct BinaryImage {
    data: Vec<u8>,
    encoding: Encoding,
    header: FileHeader,
    state: SectionHeaderState,
    segments: Vec<IndexedSegment>,
    sections: Vec<IndexedSection>,
    by_name: FxHashMap<String, usize>,
}

impl BinaryImage {
    /// Parse an ELF64 file, taking the data encoding from `EI_DATA`.
    ///
    /// # Errors
    ///
    /// Returns an error for truncated, non-ELF, non-ELF64 input, an unknown
    /// `EI_DATA` byte, or header tables that fall outside the file.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        check_ident(&data)?;
        let byte = data[EI_DATA];
        let encoding = Encoding::from_ident(byte).ok_or(ElfError::InvalidEncoding(byte))?;
        Self::parse_with_encoding(data, encoding)
    }

    /// Parse an ELF64 file, falling back to the opposite of the declared
    /// encoding when the declared one does not parse.
    ///
    /// Files whose `EI_DATA` byte was toggled keep their original field
    /// layout, so this is the entry point for reading mutated binaries.
    ///
    /// # Errors
    ///
    /// Returns the error from the declared encoding if neither encoding
    /// parses.
    pub fn parse_detect_encoding(data: Vec<u8>) -> Result<Self> {
        check_ident(&data)?;
        let Some(declared) = Encoding::from_ident(data[EI_DATA]) else {
            return Self::parse(data);
        };
        let first = match Self::parse_with_encoding(data.clone(), declared) {
            Ok(image) => return Ok(image),
            Err(e) => e,
        };
        let image = Self::parse_with_encoding(data, declared.flipped()).map_err(|_| first)?;
        warn!(
            declared = ?declared,
            actual = ?image.encoding(),
            "EI_DATA does not match the file layout"
        );
        Ok(image)
    }

    /// Parse an ELF64 file whose multi-byte fields use `encoding`, regardless
    /// of what `EI_DATA` declares.
    ///
    /// This is how an image whose declared encoding was flipped is re-read.
    ///
    /// # Errors
    ///
    /// Same as [`BinaryImage::parse`], except that `EI_DATA` is not checked.
    pub fn parse_with_encoding(data: Vec<u8>, encoding: Encoding) -> Result<Self> {
        check_ident(&data)?;

        let header = FileHeader::parse(&data[..EHDR_SIZE], encoding);
        let state = SectionHeaderState::classify(&header);
        let segments = parse_segments(&data, &header, encoding)?;
        let sections = if state == SectionHeaderState::Standard {
            parse_sections(&data, &header, encoding)?
        } else {
            Vec::new()
        };

        let mut by_name = FxHashMap::default();
        for section in &sections {
            if !section.name.is_empty() {
                by_name.entry(section.name.clone()).or_insert(section.index);
            }
        }

        debug!(
            len = data.len(),
            segments = segments.len(),
            sections = sections.len(),
            state = %state,
            "indexed ELF64 image"
        );

        Ok(Self {
            data,
            encoding,
            header,
            state,
            segments,
            sections,
            by_name,
        })
    }

    /// Raw file bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encoding actually used by the multi-byte fields.
    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Encoding declared by `EI_DATA`, if it is a known value.
    #[must_use]
    pub const fn declared_encoding(&self) -> Option<Encoding> {
        Encoding::from_ident(self.header.data)
    }

    #[must_use]
    pub const fn header(&self) -> &FileHeader {
        &self.header
    }

    #[must_use]
    pub const fn section_header_state(&self) -> SectionHeaderState {
        self.state
    }

    #[must_use]
    pub fn segments(&self) -> &[IndexedSegment] {
        &self.segments
    }

    /// Loadable segments.
    pub fn load_segments(&self) -> impl Iterator<Item = &IndexedSegment> {
        self.segments.iter().filter(|s| s.header.is_load())
    }

    /// Indexed sections (empty unless the state is `Standard`).
    #[must_use]
    pub fn sections(&self) -> &[IndexedSection] {
        &self.sections
    }

    /// Look up a section by name.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&IndexedSection> {
        self.by_name.get(name).map(|&idx| &self.sections[idx])
    }

    /// Look up a section by name, failing with `SectionNotFound`.
    ///
    /// # Errors
    ///
    /// Returns `SectionNotFound` if no section has this name.
    pub fn require_section(&self, name: &str) -> Result<&IndexedSection> {
        self.section(name)
            .ok_or_else(|| ElfError::SectionNotFound(name.to_string()))
    }

    /// File contents of a section. `SHT_NOBITS` sections are empty.
    ///
    /// # Errors
    ///
    /// Returns `SectionDataOutOfBounds` if the section extends past the file.
    pub fn section_data(&self, section: &IndexedSection) -> Result<&[u8]> {
        if section.header.sh_type == SHT_NOBITS {
            return Ok(&[]);
        }
        let range = section_range(&section.header, self.data.len())
            .ok_or_else(|| ElfError::SectionDataOutOfBounds(section.name.clone()))?;
        Ok(&self.data[range])
    }

    /// Read a file header field in the image's actual encoding.
    ///
    /// # Errors
    ///
    /// Only fails if the image is shorter than the header, which parsing
    /// already rules out.
    pub fn header_field(&self, field: HeaderField) -> Result<u64> {
        field::read_header_field(&self.data, field, self.encoding)
    }

    /// Start an edit on a copy of this image.
    #[must_use]
    pub fn edit(&self) -> ImageEdit {
        ImageEdit {
            data: self.data.clone(),
            encoding: self.encoding,
        }
    }
}

/// Pending mutation of a [`BinaryImage`].
///
/// Operates on its own copy of the bytes; the source image is unaffected
/// whatever happens to the edit.
#[derive(Debug)]
pub struct ImageEdit {
    data: Vec<u8>,
    encoding: Encoding,
}

impl ImageEdit {
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Append bytes at the current end of file and return their offset.
    pub fn append(&mut self, bytes: &[u8]) -> u64 {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Write a field of `width` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// See [`field::write_field`].
    pub fn write_field(&mut self, offset: usize, width: FieldWidth, value: u64) -> Result<()> {
        field::write_field(&mut self.data, offset, width, self.encoding, value)
    }

    /// Write a named file header field at full width.
    ///
    /// # Errors
    ///
    /// See [`field::write_field`].
    pub fn write_header_field(&mut self, field: HeaderField, value: u64) -> Result<()> {
        field::write_header_field(&mut self.data, field, self.encoding, value)
    }

    /// Overwrite `bytes.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `FieldOutOfBounds` if the range does not fit in the file.
    pub fn overwrite(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let len = self.data.len();
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= len)
            .ok_or(ElfError::FieldOutOfBounds {
                offset,
                width: bytes.len(),
                len,
            })?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Re-parse the edited bytes into a new image with a fresh index.
    ///
    /// # Errors
    ///
    /// Fails if the edit left the file in a state that no longer parses.
    pub fn finish(self) -> Result<BinaryImage> {
        BinaryImage::parse_with_encoding(self.data, self.encoding)
    }
}

fn check_ident(data: &[u8]) -> Result<()> {
    if data.len() < EHDR_SIZE {
        return Err(ElfError::TooSmall);
    }
    if data[..4] != ELF_MAGIC {
        return Err(ElfError::InvalidMagic);
    }
    let class = data[EI_CLASS];
    if class != ELF_CLASS_64 {
        return Err(ElfError::UnsupportedClass(class));
    }
    Ok(())
}

fn table_location(base: u64, index: usize, entry_size: usize) -> Option<usize> {
    usize::try_from(base)
        .ok()?
        .checked_add(index.checked_mul(entry_size)?)
}

fn parse_segments(data: &[u8], header: &FileHeader, encoding: Encoding) -> Result<Vec<IndexedSegment>> {
    if header.phnum == 0 {
        return Ok(Vec::new());
    }
    if header.phentsize as usize != PHDR_SIZE {
        return Err(ElfError::UnexpectedEntrySize {
            table: "program header",
            size: header.phentsize,
        });
    }

    let mut segments = Vec::with_capacity(header.phnum as usize);
    for index in 0..header.phnum as usize {
        let location =
            table_location(header.phoff, index, PHDR_SIZE).ok_or(ElfError::ProgramOutOfBounds)?;
        let end = location
            .checked_add(PHDR_SIZE)
            .filter(|&end| end <= data.len())
            .ok_or(ElfError::ProgramOutOfBounds)?;
        segments.push(IndexedSegment {
            index,
            location,
            header: ProgramHeader::parse(&data[location..end], encoding),
        });
    }
    Ok(segments)
}

fn parse_sections(data: &[u8], header: &FileHeader, encoding: Encoding) -> Result<Vec<IndexedSection>> {
    let mut records = Vec::with_capacity(header.shnum as usize);
    for index in 0..header.shnum as usize {
        let location =
            table_location(header.shoff, index, SHDR_SIZE).ok_or(ElfError::SectionOutOfBounds)?;
        let end = location
            .checked_add(SHDR_SIZE)
            .filter(|&end| end <= data.len())
            .ok_or(ElfError::SectionOutOfBounds)?;
        records.push((location, SectionHeader::parse(&data[location..end], encoding)));
    }

    let strtab = records
        .get(header.shstrndx as usize)
        .and_then(|(_, sh)| section_range(sh, data.len()))
        .map(|range| &data[range]);

    Ok(records
        .into_iter()
        .enumerate()
        .map(|(index, (location, header))| IndexedSection {
            index,
            location,
            name: strtab.map_or_else(String::new, |table| extract_string(table, header.name as usize)),
            header,
        })
        .collect())
}

fn section_range(header: &SectionHeader, file_len: usize) -> Option<std::ops::Range<usize>> {
    let start = usize::try_from(header.offset).ok()?;
    let size = usize::try_from(header.size).ok()?;
    let end = start.checked_add(size)?;
    (end <= file_len).then_some(start..end)
}

/// Read a NUL-terminated name from a string table.
fn extract_string(table: &[u8], offset: usize) -> String {
    table.get(offset..).map_or_else(String::new, |tail| {
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        String::from_utf8_lossy(&tail[..end]).into_owned()
    })
}
