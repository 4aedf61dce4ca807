use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand_core::RngCore;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Key generation failed")]
    KeyGenerationFailed,
}

pub type Result<T> = std::result::Result<T, EncryptionError>;

/// Encrypt a message using XChaCha20-Poly1305
///
/// # Arguments
/// * `plaintext` - The message to encrypt
/// * `key` - 32-byte encryption key
///
/// # Returns
/// Encrypted message with prepended nonce (24 bytes + ciphertext)
pub fn encrypt_message(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 32 {
        return Err(EncryptionError::InvalidKeyLength);
    }

    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| EncryptionError::InvalidKeyLength)?;

    let mut nonce_bytes = [0u8; 24];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|_| EncryptionError::EncryptionFailed)?;
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(24 + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt a message using XChaCha20-Poly1305
///
/// # Arguments
/// * `encrypted_data` - Encrypted message with prepended nonce (24 bytes + ciphertext)
/// * `key` - 32-byte encryption key
pub fn decrypt_message(encrypted_data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != 32 {
        return Err(EncryptionError::InvalidKeyLength);
    }

    // nonce + tag
    if encrypted_data.len() < 24 + 16 {
        return Err(EncryptionError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = encrypted_data.split_at(24);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|_| EncryptionError::InvalidKeyLength)?;

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| EncryptionError::DecryptionFailed)
}

/// Generate a random 32-byte symmetric key.
///
/// Surfaces RNG failure instead of panicking: log-key rotation must abort
/// cleanly when no fresh key can be drawn.
pub fn generate_key() -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(|_| EncryptionError::KeyGenerationFailed)?;
    Ok(key)
}

/// Fill a buffer of `len` random bytes (request nonces, invite seeds).
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| EncryptionError::KeyGenerationFailed)?;
    Ok(bytes)
}
