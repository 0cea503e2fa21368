//! Reservation size for the packed payload.

use std::path::Path;

use tracing::debug;

use crate::Result;
use crate::cipher::BLOCK_SIZE;
use crate::payload::METADATA_SIZE;

/// Round up to the next block, adding a full block when already aligned.
#[must_use]
pub const fn block_align(size: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    size + (block - size % block)
}

/// Bytes the reserved section must hold for a program of `file_size` bytes.
#[must_use]
pub const fn padded_size(file_size: u64, metadata_size: u64) -> u64 {
    block_align(file_size) + metadata_size
}

/// [`padded_size`] for the file at `path`, with the standard metadata size.
///
/// # Errors
///
/// Returns an IO error if the file cannot be stat'ed.
pub fn estimate_packed_size(path: &Path) -> Result<u64> {
    let file_size = std::fs::metadata(path)?.len();
    let size = padded_size(file_size, METADATA_SIZE as u64);
    debug!(path = %path.display(), file_size, size, "estimated packed size");
    Ok(size)
}
