//! Mutable ELF64 images for byte-exact binary rewriting.

#[cfg(any(test, feature = "test-support"))]
pub mod builder;
mod constants;
mod field;
mod header;
mod image;

pub use constants::*;
pub use field::{
    Encoding, FieldWidth, HeaderField, read_field, read_header_field, write_field,
    write_header_field,
};
pub use header::*;
pub use image::*;

use thiserror::Error;

/// ELF parsing and patching errors.
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("ELF data too small")]
    TooSmall,
    #[error("Invalid ELF magic number")]
    InvalidMagic,
    #[error("Unsupported ELF class: {0} (only ELF64 is supported)")]
    UnsupportedClass(u8),
    #[error("Invalid ELF data encoding: {0}")]
    InvalidEncoding(u8),
    #[error("Unexpected {table} entry size: {size}")]
    UnexpectedEntrySize { table: &'static str, size: u16 },
    #[error("Section header out of bounds")]
    SectionOutOfBounds,
    #[error("Program header out of bounds")]
    ProgramOutOfBounds,
    #[error("Field of {width} bytes at offset 0x{offset:x} exceeds file of {len} bytes")]
    FieldOutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
    #[error("Value 0x{value:x} does not fit in {width} bytes")]
    ValueTooWide { value: u64, width: usize },
    #[error("Section not found: {0}")]
    SectionNotFound(String),
    #[error("Section {0} extends beyond file")]
    SectionDataOutOfBounds(String),
}

pub type Result<T> = std::result::Result<T, ElfError>;
