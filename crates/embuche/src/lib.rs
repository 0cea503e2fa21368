//! Embuche - ELF64 anti-analysis mutations and content-addressed packing.
//!
//! Rewrites linked executables so that tools trusting section headers get a
//! wrong picture, and embeds an encrypted program in a loader whose own code
//! is the key.
//!
//! # Example
//!
//! ```ignore
//! use embuche::{FileFormatOptions, process_file};
//!
//! let options = FileFormatOptions::new()
//!     .with_remove_section_header(true)
//!     .with_flip_sections_flags(true);
//! process_file("target/app".as_ref(), &options)?;
//! ```

pub use embuche_elf::{BinaryImage, ElfError, Encoding, HeaderField, SectionHeaderState};
pub use embuche_mutate::{
    DEFAULT_MAX_PERTURBATION, FabricateConfig, MutateError, fabricate_section_headers,
    flip_endianness, remove_section_headers, shuffle_dynamic_symbols,
};
pub use embuche_pack::{
    PackError, PackedBinary, SizedProgram, UnpackedProgram, decrypt_packed, estimate_packed_size,
    padded_size, verify_round_trip,
};

mod error;
pub mod io;
mod options;
mod pipeline;

pub use error::{Error, Result};
pub use options::{FileFormatOptions, Mutation};
pub use pipeline::{apply_plan, pack_file, process_file, unpack_file};
