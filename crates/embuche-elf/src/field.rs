//! Offset-exact access to fixed-width fields.
//!
//! Every write validates bounds and value range before touching the buffer,
//! so a rejected write leaves the data exactly as it was.

use crate::constants::*;
use crate::{ElfError, Result};

/// Data encoding declared by `EI_DATA`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Little,
    Big,
}

impl Encoding {
    /// Decode an `EI_DATA` byte.
    #[must_use]
    pub const fn from_ident(byte: u8) -> Option<Self> {
        match byte {
            ELF_DATA_LSB => Some(Self::Little),
            ELF_DATA_MSB => Some(Self::Big),
            _ => None,
        }
    }

    /// The `EI_DATA` byte for this encoding.
    #[must_use]
    pub const fn ident(self) -> u8 {
        match self {
            Self::Little => ELF_DATA_LSB,
            Self::Big => ELF_DATA_MSB,
        }
    }

    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }
}

/// Width of an ELF64 field in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldWidth {
    Byte,
    Half,
    Word,
    Xword,
}

impl FieldWidth {
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
            Self::Xword => 8,
        }
    }

    /// Largest value representable in this width.
    #[must_use]
    pub const fn max_value(self) -> u64 {
        match self {
            Self::Byte => 0xFF,
            Self::Half => 0xFFFF,
            Self::Word => 0xFFFF_FFFF,
            Self::Xword => u64::MAX,
        }
    }
}

/// Named fields of the ELF64 file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderField {
    Data,
    Entry,
    PhOff,
    ShOff,
    PhEntSize,
    PhNum,
    ShEntSize,
    ShNum,
    ShStrNdx,
}

impl HeaderField {
    /// The four fields describing the section header table.
    pub const SECTION_TABLE: [Self; 4] = [Self::ShOff, Self::ShEntSize, Self::ShNum, Self::ShStrNdx];

    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            Self::Data => EI_DATA,
            Self::Entry => E_ENTRY,
            Self::PhOff => E_PHOFF,
            Self::ShOff => E_SHOFF,
            Self::PhEntSize => E_PHENTSIZE,
            Self::PhNum => E_PHNUM,
            Self::ShEntSize => E_SHENTSIZE,
            Self::ShNum => E_SHNUM,
            Self::ShStrNdx => E_SHSTRNDX,
        }
    }

    #[must_use]
    pub const fn width(self) -> FieldWidth {
        match self {
            Self::Data => FieldWidth::Byte,
            Self::Entry | Self::PhOff | Self::ShOff => FieldWidth::Xword,
            Self::PhEntSize | Self::PhNum | Self::ShEntSize | Self::ShNum | Self::ShStrNdx => {
                FieldWidth::Half
            }
        }
    }

    /// Truncated width that byte-patching scripts commonly use for this field
    /// (low dword of `e_shoff`, low byte of the 16-bit counters).
    ///
    /// Callers compare a value against this to detect inputs where such a
    /// narrow write would have left stale high-order bytes behind.
    #[must_use]
    pub const fn narrow_width(self) -> FieldWidth {
        match self {
            Self::Entry | Self::PhOff | Self::ShOff => FieldWidth::Word,
            _ => FieldWidth::Byte,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Data => "e_ident[EI_DATA]",
            Self::Entry => "e_entry",
            Self::PhOff => "e_phoff",
            Self::ShOff => "e_shoff",
            Self::PhEntSize => "e_phentsize",
            Self::PhNum => "e_phnum",
            Self::ShEntSize => "e_shentsize",
            Self::ShNum => "e_shnum",
            Self::ShStrNdx => "e_shstrndx",
        }
    }
}

fn field_range(len: usize, offset: usize, width: FieldWidth) -> Result<std::ops::Range<usize>> {
    let end = offset
        .checked_add(width.bytes())
        .filter(|&end| end <= len)
        .ok_or(ElfError::FieldOutOfBounds {
            offset,
            width: width.bytes(),
            len,
        })?;
    Ok(offset..end)
}

/// Read an unsigned field of `width` bytes at `offset`.
///
/// # Errors
///
/// Returns `FieldOutOfBounds` if the field does not fit in `data`.
pub fn read_field(data: &[u8], offset: usize, width: FieldWidth, encoding: Encoding) -> Result<u64> {
    let range = field_range(data.len(), offset, width)?;
    let bytes = &data[range];
    let n = bytes.len();
    let mut buf = [0u8; 8];
    let value = match encoding {
        Encoding::Little => {
            buf[..n].copy_from_slice(bytes);
            u64::from_le_bytes(buf)
        }
        Encoding::Big => {
            buf[8 - n..].copy_from_slice(bytes);
            u64::from_be_bytes(buf)
        }
    };
    Ok(value)
}

/// Write `value` into the field of `width` bytes at `offset`.
///
/// # Errors
///
/// Returns `FieldOutOfBounds` or `ValueTooWide`; in both cases `data` is
/// left untouched.
pub fn write_field(
    data: &mut [u8],
    offset: usize,
    width: FieldWidth,
    encoding: Encoding,
    value: u64,
) -> Result<()> {
    let range = field_range(data.len(), offset, width)?;
    if value > width.max_value() {
        return Err(ElfError::ValueTooWide {
            value,
            width: width.bytes(),
        });
    }
    let n = width.bytes();
    match encoding {
        Encoding::Little => data[range].copy_from_slice(&value.to_le_bytes()[..n]),
        Encoding::Big => data[range].copy_from_slice(&value.to_be_bytes()[8 - n..]),
    }
    Ok(())
}

/// Read a named file header field.
///
/// # Errors
///
/// Returns `FieldOutOfBounds` if `data` is shorter than the header.
pub fn read_header_field(data: &[u8], field: HeaderField, encoding: Encoding) -> Result<u64> {
    read_field(data, field.offset(), field.width(), encoding)
}

/// Write a named file header field at its full ELF64 width.
///
/// # Errors
///
/// Same as [`write_field`].
pub fn write_header_field(
    data: &mut [u8],
    field: HeaderField,
    encoding: Encoding,
    value: u64,
) -> Result<()> {
    write_field(data, field.offset(), field.width(), encoding, value)
}

/// Sequential encoder for fixed-layout records.
pub(crate) struct RecordWriter {
    buf: Vec<u8>,
    encoding: Encoding,
}

impl RecordWriter {
    pub(crate) fn new(encoding: Encoding, capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            encoding,
        }
    }

    pub(crate) fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub(crate) fn u16(&mut self, value: u16) -> &mut Self {
        match self.encoding {
            Encoding::Little => self.buf.extend_from_slice(&value.to_le_bytes()),
            Encoding::Big => self.buf.extend_from_slice(&value.to_be_bytes()),
        }
        self
    }

    pub(crate) fn u32(&mut self, value: u32) -> &mut Self {
        match self.encoding {
            Encoding::Little => self.buf.extend_from_slice(&value.to_le_bytes()),
            Encoding::Big => self.buf.extend_from_slice(&value.to_be_bytes()),
        }
        self
    }

    pub(crate) fn u64(&mut self, value: u64) -> &mut Self {
        match self.encoding {
            Encoding::Little => self.buf.extend_from_slice(&value.to_le_bytes()),
            Encoding::Big => self.buf.extend_from_slice(&value.to_be_bytes()),
        }
        self
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Decoder for a record whose length has already been checked.
pub(crate) struct RecordReader<'a> {
    bytes: &'a [u8],
    encoding: Encoding,
}

impl<'a> RecordReader<'a> {
    pub(crate) const fn new(bytes: &'a [u8], encoding: Encoding) -> Self {
        Self { bytes, encoding }
    }

    pub(crate) fn u8(&self, at: usize) -> u8 {
        self.bytes[at]
    }

    pub(crate) fn u16(&self, at: usize) -> u16 {
        let raw = [self.bytes[at], self.bytes[at + 1]];
        match self.encoding {
            Encoding::Little => u16::from_le_bytes(raw),
            Encoding::Big => u16::from_be_bytes(raw),
        }
    }

    pub(crate) fn u32(&self, at: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[at..at + 4]);
        match self.encoding {
            Encoding::Little => u32::from_le_bytes(raw),
            Encoding::Big => u32::from_be_bytes(raw),
        }
    }

    pub(crate) fn u64(&self, at: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.bytes[at..at + 8]);
        match self.encoding {
            Encoding::Little => u64::from_le_bytes(raw),
            Encoding::Big => u64::from_be_bytes(raw),
        }
    }
}
