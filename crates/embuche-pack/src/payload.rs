//! Payload stored in the reserved section.

use crate::{PackError, Result};

/// Metadata bytes in front of the ciphertext.
pub const METADATA_SIZE: usize = 16;

/// `timestamp (u64 LE) ‖ section offset (u64 LE) ‖ ciphertext`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedPayload {
    /// Placeholder for the last-run timestamp; zero until the stub runs.
    pub timestamp: u64,
    /// File offset of the section holding this payload.
    pub section_offset: u64,
    pub ciphertext: Vec<u8>,
}

impl PackedPayload {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(METADATA_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.section_offset.to_le_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// # Errors
    ///
    /// Returns `PayloadTooShort` if `bytes` cannot hold the metadata.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < METADATA_SIZE {
            return Err(PackError::PayloadTooShort(bytes.len()));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[..8]);
        let timestamp = u64::from_le_bytes(word);
        word.copy_from_slice(&bytes[8..METADATA_SIZE]);
        let section_offset = u64::from_le_bytes(word);
        Ok(Self {
            timestamp,
            section_offset,
            ciphertext: bytes[METADATA_SIZE..].to_vec(),
        })
    }
}
