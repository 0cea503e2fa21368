//! Content-addressed packer.
//!
//! The program to protect is encrypted with AES-256-CBC under the SHA-256
//! of the loader's `.text` section and stored in the loader's reserved
//! `.fini.` section. Packing follows a two-phase protocol:
//!
//! 1. [`padded_size`] tells the build how many bytes to reserve for `.fini.`.
//! 2. After linking, [`SizedProgram::pack`] fills the reservation.
//!
//! [`decrypt_packed`] is the reference decryptor used to check the result.

mod cipher;
mod packer;
mod payload;
mod size;
mod verify;

pub use cipher::{
    BLOCK_SIZE, FIXED_IV, Key, decrypt_blocks, derive_key, encrypt, pkcs7_pad, salt_key,
    strip_padding, text_digest,
};
pub use packer::{PackedBinary, RESERVED_SECTION, SizedProgram, TEXT_SECTION, UnpackedProgram};
pub use payload::{METADATA_SIZE, PackedPayload};
pub use size::{block_align, estimate_packed_size, padded_size};
pub use verify::{DecryptedPayload, decrypt_packed, verify_round_trip};

use embuche_elf::ElfError;
use thiserror::Error;

/// Packer errors.
#[derive(Error, Debug)]
pub enum PackError {
    #[error("ELF error: {0}")]
    Elf(#[from] ElfError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Section not found: {0}")]
    SectionNotFound(&'static str),
    #[error("Section {section} is {actual} bytes, expected {expected}")]
    ReservationMismatch {
        section: &'static str,
        expected: u64,
        actual: u64,
    },
    #[error(".text digest changed while packing: {expected} -> {actual}")]
    IntegrityViolation { expected: String, actual: String },
    #[error("Cipher error: {0}")]
    Cipher(&'static str),
    #[error("Payload of {0} bytes is shorter than its metadata")]
    PayloadTooShort(usize),
    #[error("Invalid block padding")]
    Padding,
    #[error("Decrypted payload does not match the original program")]
    RoundTripMismatch,
}

pub type Result<T> = std::result::Result<T, PackError>;
