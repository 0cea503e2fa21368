//! All-or-nothing file output.

use std::fs::{self, Permissions};
use std::io::Write;
use std::path::Path;

use embuche_elf::BinaryImage;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::Result;

/// Read and parse an ELF64 file, including one whose `EI_DATA` byte was
/// flipped by an earlier run.
///
/// # Errors
///
/// Returns an IO error if the file cannot be read and an ELF error if it
/// parses under neither encoding.
pub fn read_image(path: &Path) -> Result<BinaryImage> {
    let data = fs::read(path)?;
    Ok(BinaryImage::parse_detect_encoding(data)?)
}

/// Replace `path` with `bytes` in one step.
///
/// The bytes go to a temporary file in the target directory which is then
/// renamed over `path`, so a failure at any point leaves `path` as it was.
/// `permissions` is applied before the rename.
///
/// # Errors
///
/// Returns an IO error if the temporary file cannot be written, or
/// `Persist` if the rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8], permissions: Option<Permissions>) -> Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.persist(path)?;
    debug!(path = %path.display(), len = bytes.len(), "wrote file");
    Ok(())
}

/// Permission bits of an existing file.
///
/// # Errors
///
/// Returns an IO error if `path` cannot be stat'ed.
pub fn permissions_of(path: &Path) -> Result<Permissions> {
    Ok(fs::metadata(path)?.permissions())
}
