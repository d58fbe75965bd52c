//! ChaCha20-Poly1305 helpers for per-packet AEAD.
//!
//! Packets are sealed in place so the processor can reuse a single wire buffer.
//! Nonces are derived from the packet sequence number; a (key, sequence) pair
//! must never be reused, which holds as long as senders never repeat sequences
//! under one key.

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key as AeadKey, Nonce, Tag};

use crate::error::{ProcessorError, Result, TransportError};

/// Size in bytes of a send or receive key
pub const KEY_BYTES: usize = 32;

/// Size in bytes of the AEAD nonce
pub const NONCE_BYTES: usize = 12;

/// Size in bytes of the authentication tag appended to encrypted packets
pub const TAG_BYTES: usize = 16;

/// A symmetric packet key
pub type Key = [u8; KEY_BYTES];

/// Generate a fresh random key from the OS RNG
pub fn generate_key() -> Result<Key> {
    let mut key = [0u8; KEY_BYTES];
    getrandom::fill(&mut key)
        .map_err(|e| TransportError::Io(std::io::Error::other(e.to_string())))?;
    Ok(key)
}

/// Nonce layout: sequence (8 bytes, little-endian) followed by 4 zero bytes
#[inline]
pub fn sequence_nonce(sequence: u64) -> [u8; NONCE_BYTES] {
    let mut nonce = [0u8; NONCE_BYTES];
    nonce[..8].copy_from_slice(&sequence.to_le_bytes());
    nonce
}

/// Encrypt `buffer` in place and return the detached tag
pub fn seal_in_place(
    key: &Key,
    sequence: u64,
    aad: &[u8],
    buffer: &mut [u8],
) -> std::result::Result<[u8; TAG_BYTES], ProcessorError> {
    let key_ga: AeadKey = (*key).into();
    let cipher = ChaCha20Poly1305::new(&key_ga);

    let nonce: Nonce = sequence_nonce(sequence).into();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, aad, buffer)
        .map_err(|_| ProcessorError::CryptoFailed)?;

    let mut out = [0u8; TAG_BYTES];
    out.copy_from_slice(tag.as_slice());
    Ok(out)
}

/// Verify `tag` and decrypt `buffer` in place
pub fn open_in_place(
    key: &Key,
    sequence: u64,
    aad: &[u8],
    buffer: &mut [u8],
    tag: &[u8; TAG_BYTES],
) -> std::result::Result<(), ProcessorError> {
    let key_ga: AeadKey = (*key).into();
    let cipher = ChaCha20Poly1305::new(&key_ga);

    let nonce: Nonce = sequence_nonce(sequence).into();
    let tag: Tag = (*tag).into();
    cipher
        .decrypt_in_place_detached(&nonce, aad, buffer, &tag)
        .map_err(|_| ProcessorError::CryptoFailed)
}
