//! Fixed-size byte identities used throughout the chain.
//!
//! - `PublicKey`: Ed25519 signing public key (members, admins, invite nonces)
//! - `BoxPublicKey`: X25519 encryption public key (log-key wrapping)
//! - `BlockHash`: SHA-256 of a block's payload bytes
//! - `Signature`: Ed25519 signature
//! - `SecretBoxKey`: symmetric log encryption key (zeroized on drop)
//!
//! All of them travel as base64 strings on the wire.

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chain::encoding::{from_base64, to_base64};

macro_rules! base64_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                $name(bytes)
            }

            /// Copy from a slice; `None` if the length is wrong.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                if bytes.len() != $len {
                    return None;
                }
                let mut out = [0u8; $len];
                out.copy_from_slice(bytes);
                Some($name(out))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_base64(&self) -> String {
                to_base64(&self.0)
            }

            pub fn from_base64(s: &str) -> Option<Self> {
                from_base64(s).ok().and_then(|bytes| Self::from_slice(&bytes))
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..8])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_base64())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_base64())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                let bytes = from_base64(&s).map_err(D::Error::custom)?;
                Self::from_slice(&bytes).ok_or_else(|| {
                    D::Error::custom(format!(
                        "expected {} bytes for {}, got {}",
                        $len,
                        stringify!($name),
                        bytes.len()
                    ))
                })
            }
        }
    };
}

base64_newtype!(
    /// Ed25519 signing public key.
    PublicKey,
    32
);
base64_newtype!(
    /// X25519 encryption public key.
    BoxPublicKey,
    32
);
base64_newtype!(
    /// SHA-256 payload hash identifying a block.
    BlockHash,
    32
);
base64_newtype!(
    /// Ed25519 signature.
    Signature,
    64
);

impl BlockHash {
    /// Constant-time equality for chain-link comparisons.
    pub fn ct_eq(&self, other: &BlockHash) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    /// First 8 hex chars, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

/// Symmetric key used to seal audit logs. Wiped on drop, never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretBoxKey([u8; 32]);

impl SecretBoxKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SecretBoxKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SecretBoxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBoxKey(<redacted>)")
    }
}

impl Serialize for SecretBoxKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_base64(&self.0))
    }
}

impl<'de> Deserialize<'de> for SecretBoxKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut bytes = from_base64(&s).map_err(D::Error::custom)?;
        if bytes.len() != 32 {
            bytes.zeroize();
            return Err(D::Error::custom("expected 32-byte secret box key"));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(SecretBoxKey(key))
    }
}
