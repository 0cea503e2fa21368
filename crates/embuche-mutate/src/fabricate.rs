//! Fake section header table synthesis.
//!
//! After the real table has been removed, a new one is appended that maps
//! code segments under a `.data` name and data segments under a `.text`
//! name. Tools that prefer section headers over program headers derive an
//! inverted code/data map; the loader never looks at it.

use embuche_elf::{
    BinaryImage, HeaderField, SHDR_SIZE, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_PROGBITS,
    SHT_STRTAB, SectionHeader, SectionHeaderState,
};
use rand::Rng;
use tracing::{debug, info};

use crate::{Result, require_state};

/// Upper bound for the random address shift applied to fake `.data` records.
pub const DEFAULT_MAX_PERTURBATION: u64 = 250;

/// Name given to executable segments.
pub const FAKE_DATA_NAME: &str = ".data";
/// Name given to non-executable segments.
pub const FAKE_CODE_NAME: &str = ".text";
pub const SHSTRTAB_NAME: &str = ".shstrtab";

const FAKE_ALIGN: u64 = 4;

/// Options for [`fabricate_section_headers`].
#[derive(Clone, Copy, Debug)]
pub struct FabricateConfig {
    /// Inclusive bound of the shift drawn for each executable segment. The
    /// shift is further capped by the segment's file size.
    pub max_perturbation: u64,
}

impl Default for FabricateConfig {
    fn default() -> Self {
        Self {
            max_perturbation: DEFAULT_MAX_PERTURBATION,
        }
    }
}

/// `\0.data\0.text\0.shstrtab\0` plus the offset of each name.
struct Names {
    table: Vec<u8>,
    data: u32,
    code: u32,
    shstrtab: u32,
}

impl Names {
    fn new() -> Self {
        let mut table = vec![0u8];
        let mut push = |name: &str| {
            let offset = table.len() as u32;
            table.extend_from_slice(name.as_bytes());
            table.push(0);
            offset
        };
        let data = push(FAKE_DATA_NAME);
        let code = push(FAKE_CODE_NAME);
        let shstrtab = push(SHSTRTAB_NAME);
        Self {
            table,
            data,
            code,
            shstrtab,
        }
    }
}

/// Append a fabricated section header table and point the file header at it.
///
/// Records, in order: a null record, one `.data` record (alloc + exec) per
/// executable `PT_LOAD` segment, one `.text` record (alloc + write) per
/// non-executable `PT_LOAD` segment, and the `.shstrtab` record whose
/// strings follow the table directly. With one segment of each kind this
/// gives `e_shnum == 4` and `e_shstrndx == 3`.
///
/// Each `.data` record has its address shifted up and its size shrunk by
/// the same amount, drawn uniformly from
/// `0..=min(max_perturbation, p_filesz)`.
///
/// # Errors
///
/// Returns a precondition error unless all four section header fields are
/// zero. The input image is never modified.
pub fn fabricate_section_headers<R: Rng + ?Sized>(
    image: &BinaryImage,
    rng: &mut R,
    config: &FabricateConfig,
) -> Result<BinaryImage> {
    require_state(image, "section header fabrication", "absent", |state| {
        state == SectionHeaderState::Absent
    })?;

    let names = Names::new();
    let mut records = vec![SectionHeader::default()];

    for seg in image.load_segments() {
        let ph = &seg.header;
        let record = if ph.is_executable() {
            let shift = rng.gen_range(0..=config.max_perturbation.min(ph.filesz));
            debug!(segment = seg.index, vaddr = ph.vaddr, shift, "fake .data over code");
            SectionHeader {
                name: names.data,
                sh_type: SHT_PROGBITS,
                flags: SHF_ALLOC | SHF_EXECINSTR,
                addr: ph.vaddr.wrapping_add(shift),
                offset: ph.offset,
                size: ph.filesz - shift,
                addralign: FAKE_ALIGN,
                ..SectionHeader::default()
            }
        } else {
            debug!(segment = seg.index, vaddr = ph.vaddr, "fake .text over data");
            SectionHeader {
                name: names.code,
                sh_type: SHT_PROGBITS,
                flags: SHF_ALLOC | SHF_WRITE,
                addr: ph.vaddr,
                offset: ph.offset,
                size: ph.filesz,
                addralign: FAKE_ALIGN,
                ..SectionHeader::default()
            }
        };
        records.push(record);
    }

    let table_offset = image.len() as u64;
    let count = records.len() + 1;
    records.push(SectionHeader {
        name: names.shstrtab,
        sh_type: SHT_STRTAB,
        offset: table_offset + (count * SHDR_SIZE) as u64,
        size: names.table.len() as u64,
        addralign: 1,
        ..SectionHeader::default()
    });

    let encoding = image.encoding();
    let mut edit = image.edit();
    let mut appended = Vec::with_capacity(count * SHDR_SIZE + names.table.len());
    for record in &records {
        appended.extend_from_slice(&record.to_bytes(encoding));
    }
    appended.extend_from_slice(&names.table);
    let offset = edit.append(&appended);
    debug_assert_eq!(offset, table_offset);

    edit.write_header_field(HeaderField::ShOff, table_offset)?;
    edit.write_header_field(HeaderField::ShEntSize, SHDR_SIZE as u64)?;
    edit.write_header_field(HeaderField::ShNum, count as u64)?;
    edit.write_header_field(HeaderField::ShStrNdx, (count - 1) as u64)?;

    let out = edit.finish()?;
    info!(
        sections = count,
        table_offset,
        state = %out.section_header_state(),
        "fabricated section header table"
    );
    Ok(out)
}
