//! Sealed block format.
//!
//! Each block file holds one contiguous run of pool bytes, encrypted under
//! the cache key with XChaCha20-Poly1305:
//!
//! ```text
//! "KWB1" (4) | nonce (24) | ciphertext + Poly1305 tag (len + 16)
//! ```
//!
//! The sequence number and intra-block offset live in the file name
//! (`block-{seq:016x}-{offset:08x}.bin`) and are bound into the AEAD as
//! associated data, so a renamed or transplanted block file fails to open.
//! Consumption ordering is oldest-first by sequence number; the offset rises
//! as a block is partially consumed and its remainder rewritten.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use zeroize::Zeroizing;

use crate::{device_key::CacheKey, error::CacheError};

/// File magic for sealed blocks.
const BLOCK_MAGIC: &[u8; 4] = b"KWB1";

/// XChaCha20 nonce length.
const NONCE_LEN: usize = 24;

/// Poly1305 tag length.
const TAG_LEN: usize = 16;

/// Bytes a sealed block adds on top of its plaintext length.
pub const SEALED_OVERHEAD: u64 = (BLOCK_MAGIC.len() + NONCE_LEN + TAG_LEN) as u64;

/// File name for a block at `(seq, offset)`.
pub fn block_file_name(seq: u64, offset: u64) -> String {
    format!("block-{seq:016x}-{offset:08x}.bin")
}

/// Parse a block file name back to `(seq, offset)`.
///
/// Returns `None` for anything that is not a well-formed block name; the
/// store treats unknown files in a location as corruption.
pub fn parse_block_file_name(name: &str) -> Option<(u64, u64)> {
    let rest = name.strip_prefix("block-")?.strip_suffix(".bin")?;
    let (seq_hex, offset_hex) = rest.split_once('-')?;
    if seq_hex.len() != 16 || offset_hex.len() != 8 {
        return None;
    }
    let seq = u64::from_str_radix(seq_hex, 16).ok()?;
    let offset = u64::from_str_radix(offset_hex, 16).ok()?;
    Some((seq, offset))
}

fn aad(seq: u64, offset: u64) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&seq.to_be_bytes());
    out[8..].copy_from_slice(&offset.to_be_bytes());
    out
}

/// Seal pool bytes into a block file image.
pub fn seal(key: &CacheKey, seq: u64, offset: u64, plaintext: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::fill(&mut nonce).map_err(|e| CacheError::Io { detail: format!("nonce generation: {e}") })?;

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let aad = aad(seq, offset);
    let Ok(ciphertext) =
        cipher.encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad: &aad })
    else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut out = Vec::with_capacity(BLOCK_MAGIC.len() + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(BLOCK_MAGIC);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed block file image.
///
/// `seq` and `offset` must match the values the block was sealed under
/// (taken from its file name). The plaintext is zeroed when dropped.
///
/// # Errors
///
/// `Corrupt` on bad magic, truncated data, or a failed authentication tag.
pub fn open(
    key: &CacheKey,
    seq: u64,
    offset: u64,
    sealed: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CacheError> {
    if sealed.len() < (SEALED_OVERHEAD as usize) {
        return Err(CacheError::Corrupt {
            detail: format!("block {seq:#x} truncated: {} bytes", sealed.len()),
        });
    }
    let (magic, rest) = sealed.split_at(BLOCK_MAGIC.len());
    if magic != BLOCK_MAGIC {
        return Err(CacheError::Corrupt { detail: format!("block {seq:#x} has bad magic") });
    }
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let aad = aad(seq, offset);
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad: &aad })
        .map_err(|_| CacheError::Corrupt {
            detail: format!("block {seq:#x} failed authentication"),
        })?;

    Ok(Zeroizing::new(plaintext))
}
