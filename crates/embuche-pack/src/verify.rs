//! Reference decryptor.
//!
//! Mirrors what the runtime stub does to recover the program, so packed
//! binaries can be checked without running them.

use embuche_elf::BinaryImage;
use tracing::debug;

use crate::cipher::{decrypt_blocks, derive_key, strip_padding};
use crate::packer::{RESERVED_SECTION, TEXT_SECTION};
use crate::payload::PackedPayload;
use crate::{PackError, Result};

/// Contents of a packed binary's reserved section after decryption.
#[derive(Clone, Debug)]
pub struct DecryptedPayload {
    pub timestamp: u64,
    pub section_offset: u64,
    /// Plaintext with its block padding still attached.
    pub padded: Vec<u8>,
}

impl DecryptedPayload {
    /// The program with padding removed.
    ///
    /// # Errors
    ///
    /// Returns `Padding` when the key was wrong or the payload is damaged.
    pub fn original(&self) -> Result<&[u8]> {
        strip_padding(&self.padded)
    }
}

/// Decrypt the payload of a packed binary.
///
/// The key is rebuilt from the binary's own `.text`, salted with the
/// timestamp found in the payload.
///
/// # Errors
///
/// `SectionNotFound` without `.text` or `.fini.`, `PayloadTooShort` if
/// `.fini.` is smaller than the metadata, and `Cipher` if the ciphertext is
/// not block aligned.
pub fn decrypt_packed(image: &BinaryImage) -> Result<DecryptedPayload> {
    let text = image
        .section(TEXT_SECTION)
        .ok_or(PackError::SectionNotFound(TEXT_SECTION))?;
    let reserved = image
        .section(RESERVED_SECTION)
        .ok_or(PackError::SectionNotFound(RESERVED_SECTION))?;

    let payload = PackedPayload::parse(image.section_data(reserved)?)?;
    let key = derive_key(image.section_data(text)?, payload.timestamp);
    let padded = decrypt_blocks(&key, &payload.ciphertext)?;
    debug!(
        timestamp = payload.timestamp,
        section_offset = payload.section_offset,
        len = padded.len(),
        "decrypted payload"
    );
    Ok(DecryptedPayload {
        timestamp: payload.timestamp,
        section_offset: payload.section_offset,
        padded,
    })
}

/// Check that `image` decrypts back to `original`.
///
/// # Errors
///
/// Any [`decrypt_packed`] error, `Padding` on a wrong key, and
/// `RoundTripMismatch` if the plaintext differs.
pub fn verify_round_trip(image: &BinaryImage, original: &[u8]) -> Result<()> {
    let decrypted = decrypt_packed(image)?;
    if decrypted.original()? != original {
        return Err(PackError::RoundTripMismatch);
    }
    Ok(())
}
