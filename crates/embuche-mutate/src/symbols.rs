//! Dynamic symbol name shuffling.

use embuche_elf::{
    BinaryImage, FieldWidth, STB_GLOBAL, STT_FUNC, STT_NOTYPE, SYM_SIZE, SectionHeaderState,
    SymbolEntry,
};
use rand::Rng;
use tracing::{debug, info};

use crate::{MutateError, Result, require_state};

pub const DYNSYM_NAME: &str = ".dynsym";

/// Whether a symbol takes part in the name shuffle.
#[must_use]
pub const fn is_shuffled(sym: &SymbolEntry) -> bool {
    sym.sym_type() == STT_NOTYPE || sym.sym_type() == STT_FUNC || sym.binding() == STB_GLOBAL
}

/// Redistribute name offsets so that no slot keeps its own.
///
/// Offsets are drawn from the shrinking pool of not-yet-assigned slots
/// (Sattolo's algorithm), which rules out fixed points by index. Slots that
/// still end up with an equal value because two symbols shared an offset
/// are swapped with a slot where the exchange is safe. A single name, or a
/// pool where every offset is equal, is returned unchanged.
pub fn derange_names<R: Rng + ?Sized>(names: &[u32], rng: &mut R) -> Vec<u32> {
    let n = names.len();
    let mut out = names.to_vec();
    if n < 2 {
        return out;
    }

    for i in (1..n).rev() {
        let j = rng.gen_range(0..i);
        out.swap(i, j);
    }

    for i in 0..n {
        if out[i] != names[i] {
            continue;
        }
        if let Some(j) = (0..n).find(|&j| j != i && out[j] != names[i] && out[i] != names[j]) {
            out.swap(i, j);
        }
    }
    out
}

/// Append a copy of `.dynsym` with permuted names and repoint its header.
///
/// Every entry of type `NOTYPE` or `FUNC`, or with `GLOBAL` binding, gets a
/// name offset taken from another selected entry. Unselected entries are
/// copied verbatim so the new table has the size `sh_size` promises. The
/// original entries stay in the file, unreferenced by the section header.
/// The dynamic loader resolves through `DT_SYMTAB`, not the section header,
/// so runtime linking is unaffected.
///
/// # Errors
///
/// Returns a precondition error unless the section header table is
/// standard, `SectionNotFound` without `.dynsym`, and `BadSymbolEntrySize`
/// if its `sh_entsize` is not 24.
pub fn shuffle_dynamic_symbols<R: Rng + ?Sized>(image: &BinaryImage, rng: &mut R) -> Result<BinaryImage> {
    require_state(image, "symbol shuffle", "standard", |state| {
        state == SectionHeaderState::Standard
    })?;

    let dynsym = image
        .section(DYNSYM_NAME)
        .ok_or(MutateError::SectionNotFound(DYNSYM_NAME))?;
    if dynsym.header.entsize != SYM_SIZE as u64 {
        return Err(MutateError::BadSymbolEntrySize(dynsym.header.entsize));
    }

    let encoding = image.encoding();
    let data = image.section_data(dynsym)?;
    let chunks = data.chunks_exact(SYM_SIZE);
    let remainder = chunks.remainder();
    let mut entries: Vec<SymbolEntry> = chunks
        .filter_map(|chunk| SymbolEntry::parse(chunk, encoding))
        .collect();

    let selected: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, sym)| is_shuffled(sym))
        .map(|(i, _)| i)
        .collect();
    let names: Vec<u32> = selected.iter().map(|&i| entries[i].name).collect();
    let shuffled = derange_names(&names, rng);
    for (&slot, &name) in selected.iter().zip(&shuffled) {
        debug!(slot, from = entries[slot].name, to = name, "renaming symbol");
        entries[slot].name = name;
    }

    let mut table = Vec::with_capacity(data.len());
    for entry in &entries {
        table.extend_from_slice(&entry.to_bytes(encoding));
    }
    table.extend_from_slice(remainder);

    let location = dynsym.offset_field();
    let mut edit = image.edit();
    let table_offset = edit.append(&table);
    edit.write_field(location, FieldWidth::Xword, table_offset)?;
    let out = edit.finish()?;

    info!(
        symbols = entries.len(),
        shuffled = selected.len(),
        table_offset,
        "shuffled dynamic symbol names"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embuche_elf::builder::{ElfBuilder, SectionSpec, string_table};
    use embuche_elf::{PF_R, PF_X, STB_LOCAL, STT_OBJECT, STT_SECTION, SHF_ALLOC, SHF_EXECINSTR};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn sym(name: u32, binding: u8, sym_type: u8) -> SymbolEntry {
        SymbolEntry {
            name,
            info: SymbolEntry::make_info(binding, sym_type),
            other: 0,
            shndx: 1,
            value: 0x1000 + u64::from(name),
            size: 8,
        }
    }

    fn with_dynsym(symbols: Vec<SymbolEntry>, dynstr: Vec<u8>) -> BinaryImage {
        let data = ElfBuilder::new()
            .segment(PF_R | PF_X, 0x40_0000, vec![0x90; 64])
            .section(SectionSpec::over_segment(".text", SHF_ALLOC | SHF_EXECINSTR, 0))
            .section(SectionSpec::strtab(".dynstr", dynstr))
            .section(SectionSpec::dynsym(symbols, 2))
            .build();
        BinaryImage::parse(data).unwrap()
    }

    fn read_dynsym(image: &BinaryImage) -> Vec<SymbolEntry> {
        let section = image.require_section(DYNSYM_NAME).unwrap();
        image
            .section_data(section)
            .unwrap()
            .chunks_exact(SYM_SIZE)
            .map(|c| SymbolEntry::parse(c, image.encoding()).unwrap())
            .collect()
    }

    #[test]
    fn test_derange_has_no_fixed_points() {
        let names: Vec<u32> = (1..=9).collect();
        for seed in 0..64 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let out = derange_names(&names, &mut rng);
            let mut sorted = out.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, names);
            assert!(out.iter().zip(&names).all(|(a, b)| a != b));
        }
    }

    #[test]
    fn test_derange_with_duplicates() {
        let names = [0, 0, 5, 9];
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let out = derange_names(&names, &mut rng);
        assert!(out.iter().zip(&names).all(|(a, b)| a != b));
    }

    #[test]
    fn test_derange_degenerate() {
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert_eq!(derange_names(&[4], &mut rng), vec![4]);
        assert_eq!(derange_names(&[], &mut rng), Vec::<u32>::new());
        assert_eq!(derange_names(&[2, 2], &mut rng), vec![2, 2]);
    }

    #[test]
    fn test_shuffle_permutes_selected_names() {
        let (dynstr, offsets) = string_table(&["puts", "exit", "main", "environ", "local"]);
        let symbols = vec![
            sym(offsets[0], STB_GLOBAL, STT_FUNC),
            sym(offsets[1], STB_GLOBAL, STT_FUNC),
            sym(offsets[2], STB_GLOBAL, STT_FUNC),
            sym(offsets[3], STB_GLOBAL, STT_OBJECT),
            sym(offsets[4], STB_LOCAL, STT_SECTION),
        ];
        let image = with_dynsym(symbols.clone(), dynstr);
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let out = shuffle_dynamic_symbols(&image, &mut rng).unwrap();

        let after = read_dynsym(&out);
        assert_eq!(after.len(), symbols.len());
        for (before, after) in symbols[..4].iter().zip(&after) {
            assert_ne!(before.name, after.name);
            assert_eq!(before.value, after.value);
        }
        assert_eq!(after[4], symbols[4]);

        let mut before_names: Vec<_> = symbols[..4].iter().map(|s| s.name).collect();
        let mut after_names: Vec<_> = after[..4].iter().map(|s| s.name).collect();
        before_names.sort_unstable();
        after_names.sort_unstable();
        assert_eq!(before_names, after_names);
    }

    #[test]
    fn test_shuffle_appends_and_repoints() {
        let (dynstr, offsets) = string_table(&["a", "b"]);
        let symbols = vec![sym(offsets[0], STB_GLOBAL, STT_FUNC), sym(offsets[1], STB_GLOBAL, STT_FUNC)];
        let image = with_dynsym(symbols, dynstr);
        let original = image.require_section(DYNSYM_NAME).unwrap().header.clone();

        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let out = shuffle_dynamic_symbols(&image, &mut rng).unwrap();
        let moved = out.require_section(DYNSYM_NAME).unwrap();

        assert_eq!(moved.header.offset, image.len() as u64);
        assert_eq!(moved.header.size, original.size);
        assert_eq!(out.len(), image.len() + 2 * SYM_SIZE);
        let start = original.offset as usize;
        let end = start + original.size as usize;
        assert_eq!(&out.bytes()[start..end], &image.bytes()[start..end]);
    }

    #[test]
    fn test_shuffle_without_dynsym() {
        let data = ElfBuilder::new()
            .segment(PF_R | PF_X, 0x40_0000, vec![0x90; 64])
            .build();
        let image = BinaryImage::parse(data).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let err = shuffle_dynamic_symbols(&image, &mut rng).unwrap_err();
        assert!(matches!(err, MutateError::SectionNotFound(DYNSYM_NAME)));
    }

    #[test]
    fn test_shuffle_requires_section_headers() {
        let data = ElfBuilder::new()
            .segment(PF_R | PF_X, 0x40_0000, vec![0x90; 64])
            .without_section_headers()
            .build();
        let image = BinaryImage::parse(data).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let err = shuffle_dynamic_symbols(&image, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            MutateError::Precondition {
                actual: SectionHeaderState::Absent,
                ..
            }
        ));
    }
}
