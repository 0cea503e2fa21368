//! Key derivation and AES-256-CBC.

use aes::Aes256;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

use crate::{PackError, Result};

pub const BLOCK_SIZE: usize = 16;

/// Initialization vector shared with the runtime unpacking stub.
///
/// Public and identical for every packed binary, so two payloads with a
/// common plaintext prefix under the same key share a ciphertext prefix.
/// Not hardened; the stub expects exactly this value.
pub const FIXED_IV: [u8; BLOCK_SIZE] = *b"0123456789012345";

pub type Key = [u8; 32];

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// SHA-256 of a `.text` section.
#[must_use]
pub fn text_digest(text: &[u8]) -> Key {
    Sha256::digest(text).into()
}

/// XOR a key with the run timestamp: the low four timestamp bytes,
/// repeated to eight, cycled over the key. A zero timestamp is a no-op.
pub fn salt_key(key: &mut Key, timestamp: u64) {
    let ts = timestamp.to_le_bytes();
    let salt = [ts[0], ts[1], ts[2], ts[3], ts[0], ts[1], ts[2], ts[3]];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte ^= salt[i % salt.len()];
    }
}

/// Key for a payload whose metadata carries `timestamp`.
///
/// Freshly packed payloads carry zero, which yields the plain `.text` digest.
#[must_use]
pub fn derive_key(text: &[u8], timestamp: u64) -> Key {
    let mut key = text_digest(text);
    salt_key(&mut key, timestamp);
    key
}

/// PKCS#7 padding: always appends 1..=16 bytes.
#[must_use]
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.resize(data.len() + pad, pad as u8);
    out
}

/// Validate and remove PKCS#7 padding.
///
/// # Errors
///
/// Returns `Padding` if the trailing bytes are not valid padding.
pub fn strip_padding(padded: &[u8]) -> Result<&[u8]> {
    let &last = padded.last().ok_or(PackError::Padding)?;
    let pad = last as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > padded.len() || padded.len() % BLOCK_SIZE != 0 {
        return Err(PackError::Padding);
    }
    let (body, tail) = padded.split_at(padded.len() - pad);
    if tail.iter().any(|&b| b != last) {
        return Err(PackError::Padding);
    }
    Ok(body)
}

/// Pad with PKCS#7 and encrypt with AES-256-CBC under [`FIXED_IV`].
///
/// # Errors
///
/// Only fails on an invalid key or IV length, which the types rule out.
pub fn encrypt(key: &Key, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key, &FIXED_IV)
        .map_err(|_| PackError::Cipher("invalid key or IV length"))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt AES-256-CBC under [`FIXED_IV`] without removing padding.
///
/// # Errors
///
/// Returns `Cipher` if `ciphertext` is not a whole number of blocks.
pub fn decrypt_blocks(key: &Key, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcDec::new_from_slices(key, &FIXED_IV)
        .map_err(|_| PackError::Cipher("invalid key or IV length"))?;
    cipher
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| PackError::Cipher("ciphertext is not a whole number of blocks"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_always_adds_a_block_when_aligned() {
        assert_eq!(pkcs7_pad(&[0; 16]).len(), 32);
        assert_eq!(pkcs7_pad(&[0; 17]).len(), 32);
        assert_eq!(pkcs7_pad(&[]).len(), 16);
        assert_eq!(pkcs7_pad(&[1, 2, 3])[3..], [13; 13]);
    }

    #[test]
    fn test_strip_padding() {
        let padded = pkcs7_pad(b"hello");
        assert_eq!(strip_padding(&padded).unwrap(), b"hello");

        let mut bad = padded;
        bad[10] ^= 1;
        assert!(matches!(strip_padding(&bad), Err(PackError::Padding)));
        assert!(matches!(strip_padding(&[]), Err(PackError::Padding)));
        assert!(matches!(strip_padding(&[0; 16]), Err(PackError::Padding)));
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = text_digest(b"\x55\x48\x89\xe5\xc3");
        let ciphertext = encrypt(&key, b"payload").unwrap();
        assert_eq!(ciphertext.len(), 16);
        let padded = decrypt_blocks(&key, &ciphertext).unwrap();
        assert_eq!(padded, pkcs7_pad(b"payload"));
    }

    #[test]
    fn test_wrong_key_does_not_decrypt() {
        let ciphertext = encrypt(&text_digest(b"a"), b"secret program").unwrap();
        let padded = decrypt_blocks(&text_digest(b"b"), &ciphertext).unwrap();
        assert_ne!(padded, pkcs7_pad(b"secret program"));
    }

    #[test]
    fn test_partial_block_rejected() {
        let key = text_digest(b"");
        assert!(decrypt_blocks(&key, &[0; 15]).is_err());
    }

    #[test]
    fn test_digest_of_empty_text() {
        assert_eq!(
            text_digest(b""),
            [
                0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
                0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
                0x78, 0x52, 0xb8, 0x55
            ]
        );
    }

    #[test]
    fn test_salt() {
        let text = b"code";
        assert_eq!(derive_key(text, 0), text_digest(text));

        let salted = derive_key(text, 0x1122_3344_5566_7788);
        let plain = text_digest(text);
        // Only the low four timestamp bytes matter.
        let salt = [0x88, 0x77, 0x66, 0x55];
        for (i, (s, p)) in salted.iter().zip(&plain).enumerate() {
            assert_eq!(s ^ p, salt[i % 4]);
        }
    }
}
