use chacha20poly1305::{
    aead::{Aead, AeadInPlace, KeyInit, Payload},
    Tag, XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// XChaCha20 nonce size
pub const NONCE_LEN: usize = 24;
/// Poly1305 tag size
pub const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
}

pub type Result<T> = std::result::Result<T, EncryptionError>;

/// Fresh random nonce. Called once per seal; nonces are never reused.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt with XChaCha20-Poly1305
///
/// # Arguments
/// * `plaintext` - Bytes to encrypt
/// * `aad` - Associated data authenticated but not encrypted
/// * `key` - 32-byte key
/// * `nonce` - 24-byte nonce, unique per call under `key`
///
/// # Returns
/// Ciphertext with the 16-byte tag appended
pub fn seal(plaintext: &[u8], aad: &[u8], key: &[u8; 32], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| EncryptionError::EncryptionFailed)
}

/// Decrypt and authenticate the output of [`seal`].
///
/// Wrong key and modified input are indistinguishable: both yield
/// `DecryptionFailed`.
pub fn open(ciphertext: &[u8], aad: &[u8], key: &[u8; 32], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_LEN {
        return Err(EncryptionError::DecryptionFailed);
    }
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| EncryptionError::DecryptionFailed)
}

/// Like [`seal`] but returns the tag separately from the ciphertext.
pub fn seal_detached(
    plaintext: &[u8],
    aad: &[u8],
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(nonce), aad, &mut buffer)
        .map_err(|_| EncryptionError::EncryptionFailed)?;
    Ok((buffer, tag.into()))
}

/// Inverse of [`seal_detached`].
pub fn open_detached(
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
    aad: &[u8],
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(XNonce::from_slice(nonce), aad, &mut buffer, Tag::from_slice(tag))
        .map_err(|_| EncryptionError::DecryptionFailed)?;
    Ok(buffer)
}
