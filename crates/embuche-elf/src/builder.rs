//! Synthetic ELF64 writer.
//!
//! Produces small, well-formed executables with chosen segments and
//! sections. Used as fixture generator by the tests of every crate.
//!
//! Layout: file header, program headers, segment data, section data,
//! `.shstrtab`, then the section header table (8-byte aligned).

use crate::constants::*;
use crate::field::{Encoding, RecordWriter};
use crate::header::{ProgramHeader, SectionHeader, SymbolEntry};

const ELF_TYPE_EXEC: u16 = 2;
const ELF_MACHINE_X86_64: u16 = 62;
const SEGMENT_ALIGN: u64 = 0x1000;

/// Where a section's bytes come from.
#[derive(Clone, Debug)]
pub enum SectionData {
    /// Fresh bytes placed after the segment data.
    Bytes(Vec<u8>),
    /// Symbol entries, encoded in the file's encoding.
    Symbols(Vec<SymbolEntry>),
    /// The file range of a segment, by segment index.
    Segment(usize),
    /// An arbitrary existing file range.
    Alias { offset: u64, size: u64 },
}

/// A section to emit.
#[derive(Clone, Debug)]
pub struct SectionSpec {
    pub name: String,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub data: SectionData,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

impl SectionSpec {
    #[must_use]
    pub fn progbits(name: &str, flags: u64, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            sh_type: SHT_PROGBITS,
            flags,
            addr: 0,
            data: SectionData::Bytes(data),
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
        }
    }

    #[must_use]
    pub fn strtab(name: &str, data: Vec<u8>) -> Self {
        Self {
            sh_type: SHT_STRTAB,
            ..Self::progbits(name, SHF_ALLOC, data)
        }
    }

    /// A `.dynsym`-style table; `link` is the section index of its strings.
    #[must_use]
    pub fn dynsym(symbols: Vec<SymbolEntry>, link: u32) -> Self {
        Self {
            name: ".dynsym".to_string(),
            sh_type: SHT_DYNSYM,
            flags: SHF_ALLOC,
            addr: 0,
            data: SectionData::Symbols(symbols),
            link,
            info: 1,
            addralign: 8,
            entsize: SYM_SIZE as u64,
        }
    }

    /// A section covering the file range of segment `segment`.
    #[must_use]
    pub fn over_segment(name: &str, flags: u64, segment: usize) -> Self {
        Self {
            data: SectionData::Segment(segment),
            ..Self::progbits(name, flags, Vec::new())
        }
    }

    /// A section covering an existing file range.
    #[must_use]
    pub fn alias(name: &str, flags: u64, offset: u64, size: u64) -> Self {
        Self {
            data: SectionData::Alias { offset, size },
            ..Self::progbits(name, flags, Vec::new())
        }
    }
}

/// Build a string table from names; returns the table and each name's offset.
#[must_use]
pub fn string_table(names: &[&str]) -> (Vec<u8>, Vec<u32>) {
    let mut table = vec![0u8];
    let mut offsets = Vec::with_capacity(names.len());
    for name in names {
        offsets.push(u32::try_from(table.len()).unwrap_or(u32::MAX));
        table.extend_from_slice(name.as_bytes());
        table.push(0);
    }
    (table, offsets)
}

#[derive(Clone, Debug)]
struct SegmentSpec {
    flags: u32,
    vaddr: u64,
    data: Vec<u8>,
}

/// Builder for synthetic ELF64 executables.
#[derive(Clone, Debug)]
pub struct ElfBuilder {
    encoding: Encoding,
    entry: Option<u64>,
    segments: Vec<SegmentSpec>,
    sections: Vec<SectionSpec>,
    section_headers: bool,
}

impl Default for ElfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ElfBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            encoding: Encoding::Little,
            entry: None,
            segments: Vec::new(),
            sections: Vec::new(),
            section_headers: true,
        }
    }

    #[must_use]
    pub const fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub const fn entry(mut self, entry: u64) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Add a `PT_LOAD` segment.
    #[must_use]
    pub fn segment(mut self, flags: u32, vaddr: u64, data: Vec<u8>) -> Self {
        self.segments.push(SegmentSpec { flags, vaddr, data });
        self
    }

    /// Add a section. Sections get indices 1.. in insertion order.
    #[must_use]
    pub fn section(mut self, section: SectionSpec) -> Self {
        self.sections.push(section);
        self
    }

    /// Emit no section header table (all four header fields zero).
    #[must_use]
    pub const fn without_section_headers(mut self) -> Self {
        self.section_headers = false;
        self
    }

    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let phnum = self.segments.len();
        let mut out = vec![0u8; EHDR_SIZE + phnum * PHDR_SIZE];

        let mut phdrs = Vec::with_capacity(phnum);
        for seg in &self.segments {
            let offset = out.len() as u64;
            out.extend_from_slice(&seg.data);
            phdrs.push(ProgramHeader {
                p_type: PT_LOAD,
                flags: seg.flags,
                offset,
                vaddr: seg.vaddr,
                paddr: seg.vaddr,
                filesz: seg.data.len() as u64,
                memsz: seg.data.len() as u64,
                align: SEGMENT_ALIGN,
            });
        }
        for (i, ph) in phdrs.iter().enumerate() {
            let at = EHDR_SIZE + i * PHDR_SIZE;
            out[at..at + PHDR_SIZE].copy_from_slice(&ph.to_bytes(self.encoding));
        }

        let (shoff, shnum, shstrndx) = if self.section_headers {
            self.emit_sections(&mut out, &phdrs)
        } else {
            (0, 0, 0)
        };

        let entry = self.entry.unwrap_or_else(|| {
            phdrs
                .iter()
                .find(|ph| ph.is_executable())
                .map_or(0, |ph| ph.vaddr)
        });

        let mut w = RecordWriter::new(self.encoding, EHDR_SIZE);
        for &b in &ELF_MAGIC {
            w.u8(b);
        }
        w.u8(ELF_CLASS_64).u8(self.encoding.ident()).u8(1).u8(0);
        for _ in 0..8 {
            w.u8(0);
        }
        w.u16(ELF_TYPE_EXEC)
            .u16(ELF_MACHINE_X86_64)
            .u32(1)
            .u64(entry)
            .u64(if phnum == 0 { 0 } else { EHDR_SIZE as u64 })
            .u64(shoff)
            .u32(0)
            .u16(EHDR_SIZE as u16)
            .u16(if phnum == 0 { 0 } else { PHDR_SIZE as u16 })
            .u16(phnum as u16)
            .u16(if shnum == 0 { 0 } else { SHDR_SIZE as u16 })
            .u16(shnum)
            .u16(shstrndx);
        out[..EHDR_SIZE].copy_from_slice(&w.finish());
        out
    }

    fn emit_sections(&self, out: &mut Vec<u8>, phdrs: &[ProgramHeader]) -> (u64, u16, u16) {
        let mut names = vec![0u8];
        let mut headers = vec![SectionHeader::default()];

        for spec in &self.sections {
            let name = names.len() as u32;
            names.extend_from_slice(spec.name.as_bytes());
            names.push(0);

            let (offset, size, addr) = match &spec.data {
                SectionData::Bytes(bytes) => {
                    let offset = out.len() as u64;
                    out.extend_from_slice(bytes);
                    (offset, bytes.len() as u64, spec.addr)
                }
                SectionData::Symbols(symbols) => {
                    let offset = out.len() as u64;
                    for sym in symbols {
                        out.extend_from_slice(&sym.to_bytes(self.encoding));
                    }
                    (offset, (symbols.len() * SYM_SIZE) as u64, spec.addr)
                }
                SectionData::Segment(idx) => {
                    let ph = &phdrs[*idx];
                    (ph.offset, ph.filesz, ph.vaddr)
                }
                SectionData::Alias { offset, size } => (*offset, *size, spec.addr),
            };

            headers.push(SectionHeader {
                name,
                sh_type: spec.sh_type,
                flags: spec.flags,
                addr,
                offset,
                size,
                link: spec.link,
                info: spec.info,
                addralign: spec.addralign,
                entsize: spec.entsize,
            });
        }

        let shstrtab_name = names.len() as u32;
        names.extend_from_slice(b".shstrtab\0");
        let shstrtab_offset = out.len() as u64;
        out.extend_from_slice(&names);
        headers.push(SectionHeader {
            name: shstrtab_name,
            sh_type: SHT_STRTAB,
            offset: shstrtab_offset,
            size: names.len() as u64,
            addralign: 1,
            ..SectionHeader::default()
        });

        while out.len() % 8 != 0 {
            out.push(0);
        }
        let shoff = out.len() as u64;
        for sh in &headers {
            out.extend_from_slice(&sh.to_bytes(self.encoding));
        }

        let shnum = headers.len() as u16;
        (shoff, shnum, shnum - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::BinaryImage;

    #[test]
    fn test_build_minimal() {
        let data = ElfBuilder::new()
            .segment(PF_R | PF_X, 0x40_0000, vec![0xCC; 64])
            .without_section_headers()
            .build();
        assert_eq!(data.len(), EHDR_SIZE + PHDR_SIZE + 64);

        let image = BinaryImage::parse(data).unwrap();
        assert_eq!(image.header().entry, 0x40_0000);
        assert_eq!(image.header().shnum, 0);
    }

    #[test]
    fn test_section_over_segment() {
        let data = ElfBuilder::new()
            .segment(PF_R | PF_X, 0x40_0000, vec![0xCC; 64])
            .section(SectionSpec::over_segment(".text", SHF_ALLOC | SHF_EXECINSTR, 0))
            .build();
        let image = BinaryImage::parse(data).unwrap();
        let text = image.require_section(".text").unwrap();
        assert_eq!(text.header.addr, 0x40_0000);
        assert_eq!(text.header.offset, image.segments()[0].header.offset);
        assert_eq!(image.section_data(text).unwrap(), &[0xCC; 64][..]);
    }

    #[test]
    fn test_string_table() {
        let (table, offsets) = string_table(&["puts", "exit"]);
        assert_eq!(table, b"\0puts\0exit\0");
        assert_eq!(offsets, vec![1, 6]);
    }
}
