//! Inspect command.

use std::path::Path;

use embuche::BinaryImage;
use embuche::io::read_image;
use embuche_elf::{PF_R, PF_W, PF_X, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE};
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal::{self, Alignment, Table};

/// Handle the `inspect` command.
pub fn cmd_inspect(input: &Path) -> i32 {
    let image = match read_image(input) {
        Ok(image) => image,
        Err(e) => {
            error!(error = %e, input = %input.display(), "cannot parse ELF");
            return EXIT_FAILURE;
        }
    };

    print_header(&image);
    print_segments(&image);
    print_sections(&image);
    EXIT_SUCCESS
}

fn print_header(image: &BinaryImage) {
    let header = image.header();
    terminal::header("File header");
    let declared = image
        .declared_encoding()
        .map_or_else(|| format!("invalid ({})", header.data), |e| format!("{e:?}"));
    println!("  encoding      {:?} (declared {declared})", image.encoding());
    println!("  entry         {:#x}", header.entry);
    println!("  sections      {}", image.section_header_state());
    println!(
        "  shoff {:#x}  shentsize {}  shnum {}  shstrndx {}",
        header.shoff, header.shentsize, header.shnum, header.shstrndx
    );
}

fn print_segments(image: &BinaryImage) {
    terminal::header("Segments");
    let mut table = Table::new(&["#", "type", "flags", "offset", "vaddr", "filesz"]).with_alignments(
        vec![
            Alignment::Right,
            Alignment::Left,
            Alignment::Left,
            Alignment::Right,
            Alignment::Right,
            Alignment::Right,
        ],
    );
    for seg in image.segments() {
        let ph = &seg.header;
        table.add_row(vec![
            seg.index.to_string(),
            format!("{:#x}", ph.p_type),
            segment_flags(ph.flags),
            format!("{:#x}", ph.offset),
            format!("{:#x}", ph.vaddr),
            format!("{:#x}", ph.filesz),
        ]);
    }
    table.print();
}

fn print_sections(image: &BinaryImage) {
    terminal::header("Sections");
    if image.sections().is_empty() {
        println!("  (none)");
        return;
    }
    let mut table = Table::new(&["#", "name", "flags", "addr", "offset", "size"]).with_alignments(
        vec![
            Alignment::Right,
            Alignment::Left,
            Alignment::Left,
            Alignment::Right,
            Alignment::Right,
            Alignment::Right,
        ],
    );
    for section in image.sections() {
        let sh = &section.header;
        table.add_row(vec![
            section.index.to_string(),
            section.name.clone(),
            section_flags(sh.flags),
            format!("{:#x}", sh.addr),
            format!("{:#x}", sh.offset),
            format!("{:#x}", sh.size),
        ]);
    }
    table.print();
}

fn segment_flags(flags: u32) -> String {
    [(PF_R, 'R'), (PF_W, 'W'), (PF_X, 'X')]
        .iter()
        .map(|&(bit, c)| if flags & bit != 0 { c } else { '-' })
        .collect()
}

fn section_flags(flags: u64) -> String {
    [(SHF_WRITE, 'W'), (SHF_ALLOC, 'A'), (SHF_EXECINSTR, 'X')]
        .iter()
        .map(|&(bit, c)| if flags & bit != 0 { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_strings() {
        assert_eq!(segment_flags(PF_R | PF_X), "R-X");
        assert_eq!(section_flags(SHF_ALLOC | SHF_WRITE), "WA-");
    }
}
