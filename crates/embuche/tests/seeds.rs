//! Seed sweep over the randomized mutations.
//!
//! One trial per seed and property, so a failure names the seed that
//! reproduces it.

use libtest_mimic::{Arguments, Failed, Trial};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use embuche::{
    BinaryImage, FabricateConfig, fabricate_section_headers, remove_section_headers,
    shuffle_dynamic_symbols,
};
use embuche_elf::builder::{ElfBuilder, SectionSpec, string_table};
use embuche_elf::{
    EHDR_SIZE, PF_R, PF_W, PF_X, SHF_ALLOC, SHF_EXECINSTR, STB_GLOBAL, STB_LOCAL, STT_FUNC, STT_NOTYPE,
    STT_OBJECT, SYM_SIZE, SymbolEntry,
};

const SEEDS: u64 = 128;
const CODE_VADDR: u64 = 0x40_1000;

fn main() {
    let args = Arguments::from_args();

    let mut trials = Vec::new();
    for seed in 0..SEEDS {
        trials.push(Trial::test(format!("fabricate::seed_{seed}"), move || {
            check_fabrication(seed)
        }));
        trials.push(Trial::test(format!("shuffle::seed_{seed}"), move || {
            check_shuffle(seed)
        }));
    }

    libtest_mimic::run(&args, trials).exit();
}

fn ensure(cond: bool, msg: impl Into<String>) -> Result<(), Failed> {
    if cond { Ok(()) } else { Err(Failed::from(msg.into())) }
}

fn check_fabrication(seed: u64) -> Result<(), Failed> {
    // Segment sizes straddle the perturbation bound.
    let code_size = 100 + (seed as usize * 7) % 300;
    let data = ElfBuilder::new()
        .segment(PF_R | PF_X, CODE_VADDR, vec![0xCC; code_size])
        .segment(PF_R | PF_W, 0x40_8000, vec![0; 48])
        .build();
    let image = BinaryImage::parse(data).map_err(|e| e.to_string())?;
    let stripped = remove_section_headers(&image).map_err(|e| e.to_string())?;

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let out = fabricate_section_headers(&stripped, &mut rng, &FabricateConfig::default())
        .map_err(|e| e.to_string())?;

    ensure(out.sections().len() == 4, "expected 4 sections")?;
    let fake = &out
        .section(".data")
        .ok_or_else(|| Failed::from("no .data"))?
        .header;
    let shift = fake.addr.wrapping_sub(CODE_VADDR);
    ensure(shift <= 250, format!("shift {shift} above bound"))?;
    ensure(shift <= code_size as u64, format!("shift {shift} above segment size"))?;
    ensure(fake.size + shift == code_size as u64, "size and address moved unequally")?;
    ensure(
        out.bytes()[EHDR_SIZE..stripped.len()] == stripped.bytes()[EHDR_SIZE..],
        "bytes past the file header changed",
    )
}

fn check_shuffle(seed: u64) -> Result<(), Failed> {
    let words = ["open", "read", "write", "close", "exit", "puts", "errno"];
    let (dynstr, offsets) = string_table(&words);
    let count = 2 + (seed as usize % (words.len() - 1));
    let symbols: Vec<SymbolEntry> = offsets[..count]
        .iter()
        .enumerate()
        .map(|(i, &name)| {
            let (binding, sym_type) = match i % 3 {
                0 => (STB_GLOBAL, STT_FUNC),
                1 => (STB_LOCAL, STT_NOTYPE),
                _ => (STB_LOCAL, STT_OBJECT),
            };
            SymbolEntry {
                name,
                info: SymbolEntry::make_info(binding, sym_type),
                other: 0,
                shndx: 1,
                value: CODE_VADDR + i as u64 * 16,
                size: 16,
            }
        })
        .collect();

    let data = ElfBuilder::new()
        .segment(PF_R | PF_X, CODE_VADDR, vec![0x90; 128])
        .section(SectionSpec::over_segment(".text", SHF_ALLOC | SHF_EXECINSTR, 0))
        .section(SectionSpec::strtab(".dynstr", dynstr))
        .section(SectionSpec::dynsym(symbols.clone(), 2))
        .build();
    let image = BinaryImage::parse(data).map_err(|e| e.to_string())?;

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let out = shuffle_dynamic_symbols(&image, &mut rng).map_err(|e| e.to_string())?;
    let dynsym = out
        .section(".dynsym")
        .ok_or_else(|| Failed::from("no .dynsym"))?;
    let after: Vec<SymbolEntry> = out
        .section_data(dynsym)
        .map_err(|e| e.to_string())?
        .chunks_exact(SYM_SIZE)
        .filter_map(|c| SymbolEntry::parse(c, out.encoding()))
        .collect();
    ensure(after.len() == symbols.len(), "symbol count changed")?;

    // Indices 0 and 1 are always selected, so every selected slot must move.
    let mut before_names = Vec::new();
    let mut after_names = Vec::new();
    for (old, new) in symbols.iter().zip(&after) {
        ensure(old.value == new.value, "symbol value changed")?;
        if embuche_mutate::is_shuffled(old) {
            before_names.push(old.name);
            after_names.push(new.name);
            ensure(old.name != new.name, format!("symbol kept name {}", old.name))?;
        } else {
            ensure(old == new, "unselected symbol changed")?;
        }
    }
    before_names.sort_unstable();
    after_names.sort_unstable();
    ensure(before_names == after_names, "name multiset changed")
}
