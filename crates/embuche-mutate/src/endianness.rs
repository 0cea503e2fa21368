//! Declared data encoding flip.

use embuche_elf::{BinaryImage, EI_DATA, ElfError, Encoding, FieldWidth};
use tracing::info;

use crate::Result;

/// Toggle `EI_DATA` between little and big endian.
///
/// Nothing else is re-encoded: the header now lies about how every other
/// multi-byte field is stored. The returned image keeps parsing with the
/// real encoding. Applying this twice restores the input byte for byte.
///
/// # Errors
///
/// Fails if `EI_DATA` holds neither 1 nor 2.
pub fn flip_endianness(image: &BinaryImage) -> Result<BinaryImage> {
    let declared = image.header().data;
    let current = Encoding::from_ident(declared).ok_or(ElfError::InvalidEncoding(declared))?;
    let flipped = current.flipped();

    let mut edit = image.edit();
    edit.write_field(EI_DATA, FieldWidth::Byte, u64::from(flipped.ident()))?;
    let out = edit.finish()?;

    info!(from = ?current, to = ?flipped, "flipped declared data encoding");
    Ok(out)
}
