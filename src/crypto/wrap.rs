//! Sealed-box key wrapping.
//!
//! `wrap` encrypts a short secret (a log encryption key) to a recipient's
//! X25519 public key using a throwaway ephemeral keypair, so only the holder of
//! the recipient secret can `unwrap` it. Wire format:
//!
//! ```text
//! ephemeral_public_key (32) || XChaCha20-Poly1305 ciphertext (len + 16)
//! ```
//!
//! The AEAD key is HKDF-SHA256(shared_secret, salt = eph_pk || recipient_pk).
//! The nonce is SHA-256(eph_pk || recipient_pk)[..24]; every wrap uses a fresh
//! ephemeral key, so a (key, nonce) pair is never reused.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

const WRAP_INFO: &[u8] = b"TeamSigChain-KeyWrap-v1";

/// Minimum sealed length: ephemeral public key plus Poly1305 tag.
pub const WRAP_OVERHEAD: usize = 32 + 16;

#[derive(Error, Debug)]
pub enum WrapError {
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Wrap failed")]
    WrapFailed,
    #[error("Unwrap failed")]
    UnwrapFailed,
}

pub type Result<T> = std::result::Result<T, WrapError>;

/// A static X25519 keypair used as a member's encryption identity.
#[derive(Clone)]
pub struct BoxKeyPair {
    pub public_key: [u8; 32],
    secret_key: [u8; 32],
}

impl BoxKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        BoxKeyPair {
            public_key: public.to_bytes(),
            secret_key: secret.to_bytes(),
        }
    }

    /// Deterministically derive a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if seed.len() != 32 {
            return Err(WrapError::InvalidKeyLength);
        }
        let mut secret_bytes = [0u8; 32];
        secret_bytes.copy_from_slice(seed);
        let secret = StaticSecret::from(secret_bytes);
        secret_bytes.zeroize();

        let public = PublicKey::from(&secret);
        Ok(BoxKeyPair {
            public_key: public.to_bytes(),
            secret_key: secret.to_bytes(),
        })
    }

    /// The 32-byte secret scalar (equal to the seed it was derived from).
    pub fn secret_key(&self) -> &[u8; 32] {
        &self.secret_key
    }
}

impl Drop for BoxKeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for BoxKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoxKeyPair({})", &hex::encode(self.public_key)[..8])
    }
}

fn derive_wrap_cipher(
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<(XChaCha20Poly1305, [u8; 24])> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public);
    salt[32..].copy_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(WRAP_INFO, &mut key)
        .map_err(|_| WrapError::WrapFailed)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key).map_err(|_| WrapError::InvalidKeyLength);
    key.zeroize();

    let digest = Sha256::digest(salt);
    let mut nonce = [0u8; 24];
    nonce.copy_from_slice(&digest[..24]);

    Ok((cipher?, nonce))
}

/// Seal `plaintext` to `recipient_public_key`.
pub fn wrap(plaintext: &[u8], recipient_public_key: &[u8; 32]) -> Result<Vec<u8>> {
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();

    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient_public_key));
    let (cipher, nonce) =
        derive_wrap_cipher(shared.as_bytes(), &ephemeral_public, recipient_public_key)?;

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| WrapError::WrapFailed)?;

    let mut sealed = Vec::with_capacity(32 + ciphertext.len());
    sealed.extend_from_slice(&ephemeral_public);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed box addressed to `recipient`.
pub fn unwrap(sealed: &[u8], recipient: &BoxKeyPair) -> Result<Vec<u8>> {
    if sealed.len() < WRAP_OVERHEAD {
        return Err(WrapError::UnwrapFailed);
    }

    let (ephemeral_bytes, ciphertext) = sealed.split_at(32);
    let mut ephemeral_public = [0u8; 32];
    ephemeral_public.copy_from_slice(ephemeral_bytes);

    let secret = StaticSecret::from(recipient.secret_key);
    let shared = secret.diffie_hellman(&PublicKey::from(ephemeral_public));
    let (cipher, nonce) =
        derive_wrap_cipher(shared.as_bytes(), &ephemeral_public, &recipient.public_key)?;

    cipher
        .decrypt(XNonce::from_slice(&nonce), ciphertext)
        .map_err(|_| WrapError::UnwrapFailed)
}
