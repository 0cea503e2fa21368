//! ELF64 header structures.

use crate::constants::*;
use crate::field::{Encoding, RecordReader, RecordWriter};

/// ELF64 file header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub class: u8,
    /// Encoding declared by `EI_DATA`. May disagree with the encoding the
    /// rest of the file actually uses.
    pub data: u8,
    pub version: u8,
    pub abi: u8,
    pub e_type: u16,
    pub machine: u16,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub flags: u32,
    pub ehsize: u16,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

impl FileHeader {
    /// Decode the first `EHDR_SIZE` bytes of `bytes`.
    pub(crate) fn parse(bytes: &[u8], encoding: Encoding) -> Self {
        let r = RecordReader::new(bytes, encoding);
        Self {
            class: r.u8(EI_CLASS),
            data: r.u8(EI_DATA),
            version: r.u8(6),
            abi: r.u8(7),
            e_type: r.u16(0x10),
            machine: r.u16(0x12),
            entry: r.u64(E_ENTRY),
            phoff: r.u64(E_PHOFF),
            shoff: r.u64(E_SHOFF),
            flags: r.u32(E_FLAGS),
            ehsize: r.u16(E_EHSIZE),
            phentsize: r.u16(E_PHENTSIZE),
            phnum: r.u16(E_PHNUM),
            shentsize: r.u16(E_SHENTSIZE),
            shnum: r.u16(E_SHNUM),
            shstrndx: r.u16(E_SHSTRNDX),
        }
    }
}

/// Program header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl ProgramHeader {
    pub(crate) fn parse(bytes: &[u8], encoding: Encoding) -> Self {
        let r = RecordReader::new(bytes, encoding);
        Self {
            p_type: r.u32(0),
            flags: r.u32(4),
            offset: r.u64(8),
            vaddr: r.u64(16),
            paddr: r.u64(24),
            filesz: r.u64(32),
            memsz: r.u64(40),
            align: r.u64(48),
        }
    }

    /// Encode as a 56-byte record.
    #[must_use]
    pub fn to_bytes(&self, encoding: Encoding) -> Vec<u8> {
        let mut w = RecordWriter::new(encoding, PHDR_SIZE);
        w.u32(self.p_type)
            .u32(self.flags)
            .u64(self.offset)
            .u64(self.vaddr)
            .u64(self.paddr)
            .u64(self.filesz)
            .u64(self.memsz)
            .u64(self.align);
        w.finish()
    }

    #[must_use]
    pub const fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }

    #[must_use]
    pub const fn is_executable(&self) -> bool {
        (self.flags & PF_X) != 0
    }
}

/// Section header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: u32,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

impl SectionHeader {
    pub(crate) fn parse(bytes: &[u8], encoding: Encoding) -> Self {
        let r = RecordReader::new(bytes, encoding);
        Self {
            name: r.u32(0),
            sh_type: r.u32(4),
            flags: r.u64(8),
            addr: r.u64(16),
            offset: r.u64(SH_OFFSET_FIELD),
            size: r.u64(32),
            link: r.u32(40),
            info: r.u32(44),
            addralign: r.u64(48),
            entsize: r.u64(56),
        }
    }

    /// Encode as a 64-byte record.
    #[must_use]
    pub fn to_bytes(&self, encoding: Encoding) -> Vec<u8> {
        let mut w = RecordWriter::new(encoding, SHDR_SIZE);
        w.u32(self.name)
            .u32(self.sh_type)
            .u64(self.flags)
            .u64(self.addr)
            .u64(self.offset)
            .u64(self.size)
            .u32(self.link)
            .u32(self.info)
            .u64(self.addralign)
            .u64(self.entsize);
        w.finish()
    }

    #[must_use]
    pub const fn is_executable(&self) -> bool {
        (self.flags & SHF_EXECINSTR) != 0
    }

    #[must_use]
    pub const fn is_writable(&self) -> bool {
        (self.flags & SHF_WRITE) != 0
    }
}

/// ELF64 symbol table entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Offset of the name in the linked string table.
    pub name: u32,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

impl SymbolEntry {
    /// Decode a 24-byte entry.
    ///
    /// Returns `None` if `bytes` is shorter than an entry.
    #[must_use]
    pub fn parse(bytes: &[u8], encoding: Encoding) -> Option<Self> {
        if bytes.len() < SYM_SIZE {
            return None;
        }
        let r = RecordReader::new(bytes, encoding);
        Some(Self {
            name: r.u32(0),
            info: r.u8(4),
            other: r.u8(5),
            shndx: r.u16(6),
            value: r.u64(8),
            size: r.u64(16),
        })
    }

    #[must_use]
    pub fn to_bytes(&self, encoding: Encoding) -> Vec<u8> {
        let mut w = RecordWriter::new(encoding, SYM_SIZE);
        w.u32(self.name)
            .u8(self.info)
            .u8(self.other)
            .u16(self.shndx)
            .u64(self.value)
            .u64(self.size);
        w.finish()
    }

    /// Symbol type (`STT_FUNC`, `STT_OBJECT`, etc.).
    #[must_use]
    pub const fn sym_type(&self) -> u8 {
        self.info & 0xf
    }

    /// Symbol binding (`STB_LOCAL`, `STB_GLOBAL`, etc.).
    #[must_use]
    pub const fn binding(&self) -> u8 {
        self.info >> 4
    }

    #[must_use]
    pub const fn make_info(binding: u8, sym_type: u8) -> u8 {
        (binding << 4) | (sym_type & 0xf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_info_nibbles() {
        let sym = SymbolEntry {
            name: 1,
            info: SymbolEntry::make_info(STB_GLOBAL, STT_FUNC),
            other: 0,
            shndx: 0,
            value: 0,
            size: 0,
        };
        assert_eq!(sym.binding(), STB_GLOBAL);
        assert_eq!(sym.sym_type(), STT_FUNC);
    }

    #[test]
    fn test_section_header_layout() {
        let sh = SectionHeader {
            name: 7,
            sh_type: SHT_PROGBITS,
            offset: 0x1122_3344,
            ..SectionHeader::default()
        };
        let bytes = sh.to_bytes(Encoding::Little);
        assert_eq!(bytes.len(), SHDR_SIZE);
        assert_eq!(&bytes[SH_OFFSET_FIELD..SH_OFFSET_FIELD + 4], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(SectionHeader::parse(&bytes, Encoding::Little), sh);
    }

    #[test]
    fn test_symbol_big_endian_layout() {
        let sym = SymbolEntry {
            name: 0x0102,
            info: 0x12,
            other: 0,
            shndx: 0x0304,
            value: 5,
            size: 6,
        };
        let bytes = sym.to_bytes(Encoding::Big);
        assert_eq!(bytes.len(), SYM_SIZE);
        assert_eq!(&bytes[..4], &[0, 0, 1, 2]);
        assert_eq!(&bytes[6..8], &[3, 4]);
        assert!(SymbolEntry::parse(&bytes[..10], Encoding::Big).is_none());
    }
}
