use thiserror::Error;

use crate::crypto::encryption::EncryptionError;
use crate::crypto::signing::SigningError;
use crate::crypto::wrap::WrapError;
use crate::store::StoreError;

/// Errors raised while building, verifying or folding chain blocks.
///
/// Integrity errors (`BadSignature`, `BadBlockHash`, `UnexpectedBlock`,
/// `MissingCreateChain`, `SignerNotAdmin`, `TeamPublicKeyMismatch`) are fatal to
/// the fold in progress and are never retried.
#[derive(Error, Debug)]
pub enum ChainError {
    // -- integrity --
    #[error("Bad signature")]
    BadSignature,
    #[error("Payload decode error: {0}")]
    BadPayload(String),
    #[error("Block does not link to the current chain tip")]
    BadBlockHash,
    #[error("Chain must start with a create_chain block")]
    MissingCreateChain,
    #[error("Unexpected block kind at this chain position")]
    UnexpectedBlock,
    #[error("Block signer is not a team admin")]
    SignerNotAdmin,
    #[error("Creator public key does not match the team public key")]
    TeamPublicKeyMismatch,
    #[error("Invite block hash does not match the fetched chain")]
    InviteKeyMismatch,

    // -- operation preconditions --
    #[error("Member does not exist")]
    MemberDoesNotExist,
    #[error("Member already exists")]
    MemberAlreadyExists,
    #[error("Admin does not exist")]
    AdminDoesNotExist,
    #[error("Admin already exists")]
    AdminAlreadyExists,

    // -- guardrails --
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("Response page too large: {blocks} blocks (max {max})")]
    PageTooLarge { blocks: usize, max: usize },

    // -- local state --
    #[error("Payload signing failed")]
    PayloadSignatureFailed,
    #[error("No last block hash; fetch the newest block first")]
    MissingLastBlockHash,
    #[error("No outstanding invitation")]
    NoActiveInvitation,
    #[error("Bad invite seed")]
    BadInviteSeed,
    #[error("Bad invite link: {0}")]
    BadInviteLink(String),
    #[error("Log key rotation failed: could not generate a new key")]
    RotateKeyGeneration,
    #[error("No last log block hash")]
    MissingLastLogBlockHash,
    #[error("Log encryption failed")]
    LogEncryptionFailed,
    #[error("Audit logging is not enabled for this team")]
    LoggingDisabled,

    // -- wrapped layers --
    #[error("Key wrap error: {0}")]
    KeyWrap(#[from] WrapError),
    #[error("Signing key error: {0}")]
    Signing(#[from] SigningError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<EncryptionError> for ChainError {
    fn from(e: EncryptionError) -> Self {
        match e {
            EncryptionError::KeyGenerationFailed => ChainError::RotateKeyGeneration,
            _ => ChainError::LogEncryptionFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
