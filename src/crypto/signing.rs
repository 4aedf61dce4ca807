use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroize;

/// Ed25519 seed length (libsodium `crypto_sign_SEEDBYTES`).
pub const SEED_BYTES: usize = 32;

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Invalid seed length")]
    InvalidSeedLength,
}

pub type Result<T> = std::result::Result<T, SigningError>;

/// An Ed25519 keypair. The secret half is the 32-byte seed and is wiped on drop.
#[derive(Clone)]
pub struct SigningKeyPair {
    pub public_key: [u8; 32],
    secret_key: [u8; 32],
}

impl SigningKeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        SigningKeyPair {
            public_key: signing_key.verifying_key().to_bytes(),
            secret_key: signing_key.to_bytes(),
        }
    }

    /// Deterministically derive a keypair from a 32-byte seed.
    ///
    /// Invitation nonce keys are rebuilt from the seed carried in the invite link,
    /// so the same seed must always yield the same keypair.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if seed.len() != SEED_BYTES {
            return Err(SigningError::InvalidSeedLength);
        }

        let mut seed_bytes = [0u8; 32];
        seed_bytes.copy_from_slice(seed);
        let signing_key = SigningKey::from_bytes(&seed_bytes);
        seed_bytes.zeroize();

        Ok(SigningKeyPair {
            public_key: signing_key.verifying_key().to_bytes(),
            secret_key: signing_key.to_bytes(),
        })
    }

    /// The 32-byte secret seed.
    pub fn secret_key(&self) -> &[u8; 32] {
        &self.secret_key
    }

    /// Sign `data` with this keypair.
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        let signing_key = SigningKey::from_bytes(&self.secret_key);
        signing_key.sign(data).to_bytes()
    }
}

impl Drop for SigningKeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair({})", &hex::encode(self.public_key)[..8])
    }
}

/// Verify an Ed25519 signature.
///
/// Never errors: a malformed public key or a signature that does not verify
/// both yield `false`.
pub fn verify_signature(data: &[u8], signature: &[u8; 64], public_key: &[u8; 32]) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    let sig = Signature::from_bytes(signature);
    verifying_key.verify(data, &sig).is_ok()
}
