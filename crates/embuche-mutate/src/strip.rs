//! Section header table removal.

use embuche_elf::{BinaryImage, HeaderField, SectionHeaderState};
use tracing::{debug, info, warn};

use crate::Result;

/// Zero `e_shoff`, `e_shentsize`, `e_shnum` and `e_shstrndx`.
///
/// The section header records stay in the file as unreferenced bytes. The
/// loader only reads program headers, so the binary still runs.
///
/// An image that already has no section headers is returned unchanged.
///
/// # Errors
///
/// Returns an error if a header field cannot be read or written.
pub fn remove_section_headers(image: &BinaryImage) -> Result<BinaryImage> {
    if image.section_header_state() == SectionHeaderState::Absent {
        debug!("section header table already absent");
        return Ok(image.clone());
    }

    let mut edit = image.edit();
    for field in HeaderField::SECTION_TABLE {
        let old = image.header_field(field)?;
        if old > field.narrow_width().max_value() {
            // A low-bytes-only patch would have left the high bytes set here.
            warn!(
                field = field.name(),
                value = old,
                "field exceeds its commonly patched width; clearing at full width"
            );
        }
        debug!(field = field.name(), old, "clearing");
        edit.write_header_field(field, 0)?;
    }

    let out = edit.finish()?;
    info!(state = %out.section_header_state(), "removed section header table");
    Ok(out)
}
