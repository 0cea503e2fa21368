//! Structural ELF64 mutations.
//!
//! Each mutation takes a [`BinaryImage`] and returns a new one; the input is
//! never modified. Preconditions on the section header table are checked
//! against [`SectionHeaderState`] before any byte is touched:
//!
//! | Mutation | Requires |
//! |----------|----------|
//! | [`flip_endianness`] | any |
//! | [`remove_section_headers`] | any |
//! | [`fabricate_section_headers`] | `Absent` |
//! | [`shuffle_dynamic_symbols`] | `Standard` |

mod endianness;
mod fabricate;
mod strip;
mod symbols;

pub use endianness::flip_endianness;
pub use fabricate::{
    DEFAULT_MAX_PERTURBATION, FAKE_CODE_NAME, FAKE_DATA_NAME, FabricateConfig,
    SHSTRTAB_NAME, fabricate_section_headers,
};
pub use strip::remove_section_headers;
pub use symbols::{DYNSYM_NAME, derange_names, is_shuffled, shuffle_dynamic_symbols};

use embuche_elf::{BinaryImage, ElfError, SectionHeaderState};
use thiserror::Error;

/// Mutation errors.
#[derive(Error, Debug)]
pub enum MutateError {
    #[error("ELF error: {0}")]
    Elf(#[from] ElfError),
    #[error("{operation} requires {expected} section headers, image is {actual}")]
    Precondition {
        operation: &'static str,
        expected: &'static str,
        actual: SectionHeaderState,
    },
    #[error("Section not found: {0}")]
    SectionNotFound(&'static str),
    #[error("Unexpected symbol entry size: {0}")]
    BadSymbolEntrySize(u64),
}

pub type Result<T> = std::result::Result<T, MutateError>;

fn require_state(
    image: &BinaryImage,
    operation: &'static str,
    expected: &'static str,
    accept: impl Fn(SectionHeaderState) -> bool,
) -> Result<()> {
    let actual = image.section_header_state();
    if accept(actual) {
        Ok(())
    } else {
        Err(MutateError::Precondition {
            operation,
            expected,
            actual,
        })
    }
}
