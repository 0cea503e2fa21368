//! `Unpacked → Sized → Packed` pipeline.

use embuche_elf::BinaryImage;
use tracing::{debug, info, warn};

use crate::cipher::{derive_key, encrypt, text_digest};
use crate::payload::{METADATA_SIZE, PackedPayload};
use crate::size::padded_size;
use crate::{PackError, Result};

/// Section whose digest keys the cipher.
pub const TEXT_SECTION: &str = ".text";
/// Section reserved by the build to receive the payload.
pub const RESERVED_SECTION: &str = ".fini.";

/// A program that has not been measured yet.
#[derive(Clone, Debug)]
pub struct UnpackedProgram {
    program: Vec<u8>,
}

impl UnpackedProgram {
    #[must_use]
    pub const fn new(program: Vec<u8>) -> Self {
        Self { program }
    }

    /// Compute the reservation the build has to make for this program.
    #[must_use]
    pub fn size(self) -> SizedProgram {
        let reserved_size = padded_size(self.program.len() as u64, METADATA_SIZE as u64);
        debug!(program = self.program.len(), reserved_size, "sized program");
        SizedProgram {
            program: self.program,
            reserved_size,
        }
    }
}

/// A program whose reservation size is known.
#[derive(Clone, Debug)]
pub struct SizedProgram {
    program: Vec<u8>,
    reserved_size: u64,
}

impl SizedProgram {
    /// Exact size of the `.fini.` section the loader must carry.
    #[must_use]
    pub const fn reserved_size(&self) -> u64 {
        self.reserved_size
    }

    #[must_use]
    pub fn program(&self) -> &[u8] {
        &self.program
    }

    /// Encrypt the program into `loader`'s reserved section.
    ///
    /// The key is the SHA-256 of `loader`'s `.text`. After the payload is
    /// written, `.text` of the result is hashed again; packing fails if the
    /// write disturbed it, because the stub could then never rebuild the key.
    /// `loader` itself is never modified.
    ///
    /// # Errors
    ///
    /// `SectionNotFound` without `.text` or `.fini.`, `ReservationMismatch`
    /// if `.fini.` is not exactly [`Self::reserved_size`] bytes, and
    /// `IntegrityViolation` if `.text` changed.
    pub fn pack(&self, loader: &BinaryImage) -> Result<PackedBinary> {
        let text = loader
            .section(TEXT_SECTION)
            .ok_or(PackError::SectionNotFound(TEXT_SECTION))?;
        let reserved = loader
            .section(RESERVED_SECTION)
            .ok_or(PackError::SectionNotFound(RESERVED_SECTION))?;
        if reserved.header.size != self.reserved_size {
            return Err(PackError::ReservationMismatch {
                section: RESERVED_SECTION,
                expected: self.reserved_size,
                actual: reserved.header.size,
            });
        }

        let text_bytes = loader.section_data(text)?;
        let digest = text_digest(text_bytes);
        let key = derive_key(text_bytes, 0);
        debug!(text_sha256 = %hex::encode(digest), "derived key from .text");

        warn!("payload is encrypted under the fixed public IV; not a hardened cipher setup");
        let payload = PackedPayload {
            timestamp: 0,
            section_offset: reserved.header.offset,
            ciphertext: encrypt(&key, &self.program)?,
        };
        let blob = payload.to_bytes();
        if blob.len() as u64 != reserved.header.size {
            return Err(PackError::ReservationMismatch {
                section: RESERVED_SECTION,
                expected: blob.len() as u64,
                actual: reserved.header.size,
            });
        }

        let offset = usize::try_from(reserved.header.offset)
            .map_err(|_| embuche_elf::ElfError::SectionDataOutOfBounds(reserved.name.clone()))?;
        let mut edit = loader.edit();
        edit.overwrite(offset, &blob)?;
        let image = edit.finish()?;

        let text_after = image
            .section(TEXT_SECTION)
            .ok_or(PackError::SectionNotFound(TEXT_SECTION))?;
        let digest_after = text_digest(image.section_data(text_after)?);
        if digest_after != digest {
            return Err(PackError::IntegrityViolation {
                expected: hex::encode(digest),
                actual: hex::encode(digest_after),
            });
        }

        info!(
            text_sha256 = %hex::encode(digest),
            payload = blob.len(),
            section_offset = payload.section_offset,
            "packed program"
        );
        Ok(PackedBinary {
            image,
            text_digest: digest,
        })
    }
}

/// A loader carrying an encrypted program.
#[derive(Clone, Debug)]
pub struct PackedBinary {
    image: BinaryImage,
    text_digest: [u8; 32],
}

impl PackedBinary {
    #[must_use]
    pub const fn image(&self) -> &BinaryImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> BinaryImage {
        self.image
    }

    /// Digest of `.text`, identical before and after packing.
    #[must_use]
    pub const fn text_digest(&self) -> &[u8; 32] {
        &self.text_digest
    }
}
