//! Signed blocks and the server wire envelopes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chain::errors::{ChainError, Result};
use crate::chain::keys::{BlockHash, PublicKey, Signature};
use crate::chain::limits::{check_page_size, check_payload_size};
use crate::chain::payload::Payload;
use crate::crypto::signing::{verify_signature, SigningKeyPair};

/// A signed payload. Its identity is the SHA-256 of the payload bytes only.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub public_key: PublicKey,
    /// UTF-8 JSON of a [`Payload`], kept verbatim: the signature and hash
    /// cover these exact bytes.
    pub payload: String,
    pub signature: Signature,
}

/// Outgoing requests share the block shape.
pub type Request = Block;

impl Block {
    /// Encode `payload` and sign it with `keypair`.
    pub fn sign(payload: &Payload, keypair: &SigningKeyPair) -> Result<Block> {
        let payload = payload.to_json()?;
        let signature = keypair.sign(payload.as_bytes());
        Ok(Block {
            public_key: PublicKey::from_bytes(keypair.public_key),
            payload,
            signature: Signature::from_bytes(signature),
        })
    }

    pub fn hash(&self) -> BlockHash {
        let digest = Sha256::digest(self.payload.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        BlockHash::from_bytes(out)
    }

    /// Decode the payload, bounding its size first.
    pub fn decode_payload(&self) -> Result<Payload> {
        check_payload_size(self.payload.len())?;
        Payload::from_json(&self.payload)
    }

    /// Verify the signature over the raw payload bytes against `signer`.
    pub fn verify_with(&self, signer: &PublicKey) -> bool {
        verify_signature(
            self.payload.as_bytes(),
            self.signature.as_bytes(),
            signer.as_bytes(),
        )
    }

    /// Verify against the block's own stated public key.
    pub fn verify(&self) -> bool {
        self.verify_with(&self.public_key)
    }
}

/// One page of a read.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadResponse {
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub more: bool,
}

impl ReadResponse {
    pub fn check_size(&self) -> Result<()> {
        check_page_size(self.blocks.len())
    }
}

/// Server envelope: `{"success": T}` or `{"error": "message"}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServerResponse<T> {
    Success(T),
    Error(String),
}

impl<T> ServerResponse<T> {
    pub fn into_result(self) -> std::result::Result<T, String> {
        match self {
            ServerResponse::Success(value) => Ok(value),
            ServerResponse::Error(message) => Err(message),
        }
    }
}

impl<T: for<'de> Deserialize<'de>> ServerResponse<T> {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ChainError::BadPayload(e.to_string()))
    }
}
