//! File-level drivers for the mutations and the packer.

use std::fs;
use std::path::Path;

use embuche_elf::BinaryImage;
use embuche_mutate::{
    fabricate_section_headers, flip_endianness, remove_section_headers, shuffle_dynamic_symbols,
};
use embuche_pack::{PackedBinary, UnpackedProgram, decrypt_packed};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info, info_span};

use crate::io::{permissions_of, read_image, write_atomic};
use crate::{FileFormatOptions, Mutation, Result};

/// Apply `plan` to `image` in order.
///
/// # Errors
///
/// Returns the first failing mutation's error. Nothing is returned for the
/// steps that succeeded before it.
pub fn apply_plan<R: Rng + ?Sized>(
    image: BinaryImage,
    plan: &[Mutation],
    options: &FileFormatOptions,
    rng: &mut R,
) -> Result<BinaryImage> {
    let mut image = image;
    for &step in plan {
        debug!(step = step.name(), state = %image.section_header_state(), "applying");
        image = match step {
            Mutation::RemoveSectionHeaders => remove_section_headers(&image)?,
            Mutation::FabricateSectionHeaders => {
                fabricate_section_headers(&image, rng, &options.fabricate_config())?
            }
            Mutation::ShuffleSymbols => shuffle_dynamic_symbols(&image, rng)?,
            Mutation::FlipEndianness => flip_endianness(&image)?,
        };
    }
    Ok(image)
}

/// Rewrite the ELF file at `path` according to `options`.
///
/// The file is replaced only if every mutation succeeds, and keeps its
/// permission bits. Returns the seed that drove the random choices.
///
/// # Errors
///
/// Returns `ConflictingOptions` for an invalid option set, or the error of
/// the first failing read, mutation, or write.
pub fn process_file(path: &Path, options: &FileFormatOptions) -> Result<u64> {
    let _span = info_span!("mutate", path = %path.display()).entered();
    let plan = options.plan()?;
    let seed = options.seed.unwrap_or_else(rand::random);
    if plan.is_empty() {
        info!("no mutation enabled");
        return Ok(seed);
    }

    let image = read_image(path)?;
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let out = apply_plan(image, &plan, options, &mut rng)?;
    write_atomic(path, out.bytes(), Some(permissions_of(path)?))?;
    info!(steps = plan.len(), seed, len = out.len(), "rewrote file");
    Ok(seed)
}

/// Pack `program` into `loader` and write the result to `output`.
///
/// `output` gets the loader's permission bits and is only created if
/// packing succeeded.
///
/// # Errors
///
/// Returns IO errors for unreadable inputs and any packing error.
pub fn pack_file(loader: &Path, program: &Path, output: &Path) -> Result<PackedBinary> {
    let _span = info_span!("pack", loader = %loader.display()).entered();
    let image = read_image(loader)?;
    let program = UnpackedProgram::new(fs::read(program)?).size();
    let packed = program.pack(&image)?;
    write_atomic(output, packed.image().bytes(), Some(permissions_of(loader)?))?;
    info!(output = %output.display(), "wrote packed binary");
    Ok(packed)
}

/// Recover the original program from a packed binary.
///
/// # Errors
///
/// Returns IO and ELF errors for an unreadable file and any decryption
/// error.
pub fn unpack_file(path: &Path) -> Result<Vec<u8>> {
    let image = read_image(path)?;
    let decrypted = decrypt_packed(&image)?;
    Ok(decrypted.original()?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use embuche_elf::builder::ElfBuilder;
    use embuche_elf::{PF_R, PF_W, PF_X, SectionHeaderState};
    use embuche_mutate::MutateError;

    fn stripped_pair() -> BinaryImage {
        let data = ElfBuilder::new()
            .segment(PF_R | PF_X, 0x40_1000, vec![0x90; 512])
            .segment(PF_R | PF_W, 0x40_3000, vec![0; 64])
            .build();
        BinaryImage::parse(data).unwrap()
    }

    #[test]
    fn test_apply_plan_removal_then_fabrication() {
        let options = FileFormatOptions::new()
            .with_remove_section_header(true)
            .with_flip_sections_flags(true);
        let plan = options.plan().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let out = apply_plan(stripped_pair(), &plan, &options, &mut rng).unwrap();
        assert_eq!(out.section_header_state(), SectionHeaderState::Standard);
        assert_eq!(out.sections().len(), 4);
    }

    #[test]
    fn test_apply_plan_stops_at_first_failure() {
        // No .dynsym: the shuffle fails after the flip would have been queued.
        let options = FileFormatOptions::new()
            .with_mixing_symbols(true)
            .with_endianness(true);
        let plan = options.plan().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let err = apply_plan(stripped_pair(), &plan, &options, &mut rng).unwrap_err();
        assert!(matches!(err, Error::Mutate(MutateError::SectionNotFound(_))));
    }

    #[test]
    fn test_endianness_only() {
        let options = FileFormatOptions::new().with_endianness(true);
        let image = stripped_pair();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let out = apply_plan(image.clone(), &options.plan().unwrap(), &options, &mut rng).unwrap();
        assert_ne!(out.bytes(), image.bytes());
        assert_eq!(out.len(), image.len());
    }
}
