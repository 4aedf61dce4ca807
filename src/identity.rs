//! The local device's team identity, and invite links.
//!
//! A `TeamIdentity` owns the device's signing and encryption keypairs, the
//! team's genesis public key, and the running audit-log key state. It is
//! persisted as JSON; secret seeds are wiped from memory on drop.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::chain::encoding::{base64_bytes, from_base64, to_base64_url};
use crate::chain::errors::{ChainError, Result};
use crate::chain::keys::{BlockHash, BoxPublicKey, PublicKey, SecretBoxKey};
use crate::chain::payload::{TeamPointer, WrappedKey};
use crate::chain::types::MemberIdentity;
use crate::crypto::encryption::random_bytes;
use crate::crypto::signing::{SigningKeyPair, SEED_BYTES};
use crate::crypto::wrap::{self, BoxKeyPair};
use crate::store::TeamDataStore;

// ---------------------------------------------------------------------------
// Log key state
// ---------------------------------------------------------------------------

/// Audit-log key material carried through a fold.
///
/// `checkpoint` is the hash of this device's newest log-chain block; a log
/// chain exists once it is set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogKeyState {
    pub encryption_key: Option<SecretBoxKey>,
    pub checkpoint: Option<BlockHash>,
}

impl LogKeyState {
    pub fn has_log_chain(&self) -> bool {
        self.checkpoint.is_some()
    }
}

// ---------------------------------------------------------------------------
// Team identity
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "IdentityRecord", into = "IdentityRecord")]
pub struct TeamIdentity {
    pub id: String,
    pub email: String,
    keypair: SigningKeyPair,
    encryption_keypair: BoxKeyPair,
    pub team_id: String,
    pub initial_team_public_key: PublicKey,
    /// Newest main-chain block this device knows must exist.
    pub checkpoint: BlockHash,
    pub log_checkpoint: Option<BlockHash>,
    pub log_encryption_key: Option<SecretBoxKey>,
}

impl TeamIdentity {
    /// Fresh keypairs for a device joining (or founding) the team rooted at
    /// `initial_team_public_key`.
    pub fn new(
        email: impl Into<String>,
        initial_team_public_key: PublicKey,
        checkpoint: BlockHash,
    ) -> Result<Self> {
        Ok(Self::with_keys(
            email,
            SigningKeyPair::generate(),
            BoxKeyPair::generate(),
            initial_team_public_key,
            checkpoint,
        ))
    }

    pub(crate) fn with_keys(
        email: impl Into<String>,
        keypair: SigningKeyPair,
        encryption_keypair: BoxKeyPair,
        initial_team_public_key: PublicKey,
        checkpoint: BlockHash,
    ) -> Self {
        let id = random_bytes(16)
            .map(hex::encode)
            .unwrap_or_else(|_| hex::encode(&keypair.public_key[..16]));
        TeamIdentity {
            id,
            email: email.into(),
            keypair,
            encryption_keypair,
            team_id: initial_team_public_key.to_hex(),
            initial_team_public_key,
            checkpoint,
            log_checkpoint: None,
            log_encryption_key: None,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.keypair.public_key)
    }

    pub fn encryption_public_key(&self) -> BoxPublicKey {
        BoxPublicKey::from_bytes(self.encryption_keypair.public_key)
    }

    pub fn keypair(&self) -> &SigningKeyPair {
        &self.keypair
    }

    pub fn encryption_keypair(&self) -> &BoxKeyPair {
        &self.encryption_keypair
    }

    /// This device's on-chain identity.
    pub fn member_identity(&self, ssh_public_key: Vec<u8>, pgp_public_key: Vec<u8>) -> MemberIdentity {
        MemberIdentity {
            public_key: self.public_key(),
            encryption_public_key: self.encryption_public_key(),
            email: self.email.clone(),
            ssh_public_key,
            pgp_public_key,
        }
    }

    pub fn log_keys(&self) -> LogKeyState {
        LogKeyState {
            encryption_key: self.log_encryption_key.clone(),
            checkpoint: self.log_checkpoint,
        }
    }

    pub fn set_log_keys(&mut self, state: LogKeyState) {
        self.log_encryption_key = state.encryption_key;
        self.log_checkpoint = state.checkpoint;
    }

    /// Where the next read should start: after our newest block, or at
    /// genesis when we have none.
    pub fn team_pointer<S: TeamDataStore>(&self, store: &S) -> Result<TeamPointer> {
        Ok(match store.last_block_hash()? {
            Some(hash) => TeamPointer::LastBlockHash(hash),
            None => TeamPointer::PublicKey(self.initial_team_public_key),
        })
    }

    pub fn is_checkpoint_reached<S: TeamDataStore>(&self, store: &S) -> Result<bool> {
        Ok(store.has_block(&self.checkpoint)?)
    }

    /// Find and open the log key wrapped to this device, if any.
    pub fn open_wrapped_key(&self, wrapped_keys: &[WrappedKey]) -> Result<Option<SecretBoxKey>> {
        let own = self.encryption_public_key();
        let Some(wrapped) = wrapped_keys.iter().find(|w| w.public_key == own) else {
            return Ok(None);
        };
        let mut plain = wrap::unwrap(&wrapped.ciphertext, &self.encryption_keypair)?;
        if plain.len() != 32 {
            plain.zeroize();
            return Err(ChainError::LogEncryptionFailed);
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&plain);
        plain.zeroize();
        Ok(Some(SecretBoxKey::from_bytes(key)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ChainError::BadPayload(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ChainError::BadPayload(e.to_string()))
    }
}

/// Persisted form: keypairs are stored as their seeds.
#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    id: String,
    email: String,
    #[serde(with = "base64_bytes")]
    signing_seed: Vec<u8>,
    #[serde(with = "base64_bytes")]
    encryption_seed: Vec<u8>,
    team_id: String,
    initial_team_public_key: PublicKey,
    checkpoint: BlockHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log_checkpoint: Option<BlockHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log_encryption_key: Option<SecretBoxKey>,
}

impl Drop for IdentityRecord {
    fn drop(&mut self) {
        self.signing_seed.zeroize();
        self.encryption_seed.zeroize();
    }
}

impl From<TeamIdentity> for IdentityRecord {
    fn from(identity: TeamIdentity) -> Self {
        IdentityRecord {
            id: identity.id.clone(),
            email: identity.email.clone(),
            signing_seed: identity.keypair.secret_key().to_vec(),
            encryption_seed: identity.encryption_keypair.secret_key().to_vec(),
            team_id: identity.team_id.clone(),
            initial_team_public_key: identity.initial_team_public_key,
            checkpoint: identity.checkpoint,
            log_checkpoint: identity.log_checkpoint,
            log_encryption_key: identity.log_encryption_key.clone(),
        }
    }
}

impl TryFrom<IdentityRecord> for TeamIdentity {
    type Error = ChainError;

    fn try_from(record: IdentityRecord) -> Result<Self> {
        Ok(TeamIdentity {
            id: record.id.clone(),
            email: record.email.clone(),
            keypair: SigningKeyPair::from_seed(&record.signing_seed)?,
            encryption_keypair: BoxKeyPair::from_seed(&record.encryption_seed)?,
            team_id: record.team_id.clone(),
            initial_team_public_key: record.initial_team_public_key,
            checkpoint: record.checkpoint,
            log_checkpoint: record.log_checkpoint,
            log_encryption_key: record.log_encryption_key.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Invite links
// ---------------------------------------------------------------------------

const INVITE_PREFIX: &str = "kr://join_team/";

/// An out-of-band team invitation:
/// `kr://join_team/<team public key>/<invite block hash>/<nonce seed>`.
///
/// The seed deterministically yields the nonce keypair whose public half the
/// `invite_member` block recorded; the invitee signs `accept_invite` with it.
#[derive(Clone, PartialEq, Eq)]
pub struct TeamInvite {
    pub initial_team_public_key: PublicKey,
    pub block_hash: BlockHash,
    seed: Vec<u8>,
}

impl TeamInvite {
    pub fn new(initial_team_public_key: PublicKey, block_hash: BlockHash, seed: Vec<u8>) -> Self {
        TeamInvite {
            initial_team_public_key,
            block_hash,
            seed,
        }
    }

    pub fn seed(&self) -> &[u8] {
        &self.seed
    }

    /// Rebuild the invitation nonce keypair.
    pub fn nonce_keypair(&self) -> Result<SigningKeyPair> {
        if self.seed.len() != SEED_BYTES {
            return Err(ChainError::BadInviteSeed);
        }
        SigningKeyPair::from_seed(&self.seed).map_err(|_| ChainError::BadInviteSeed)
    }

    /// URL-safe link; `/` never appears inside a component.
    pub fn to_link(&self) -> String {
        format!(
            "{}{}/{}/{}",
            INVITE_PREFIX,
            to_base64_url(self.initial_team_public_key.as_bytes()),
            to_base64_url(self.block_hash.as_bytes()),
            to_base64_url(&self.seed)
        )
    }

    pub fn parse(link: &str) -> Result<Self> {
        let path = link
            .trim()
            .strip_prefix(INVITE_PREFIX)
            .ok_or_else(|| ChainError::BadInviteLink("not a join_team link".into()))?;
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() < 3 {
            return Err(ChainError::BadInviteLink("missing components".into()));
        }

        let initial_team_public_key = PublicKey::from_base64(parts[0])
            .ok_or_else(|| ChainError::BadInviteLink("bad team public key".into()))?;
        let block_hash = BlockHash::from_base64(parts[1])
            .ok_or_else(|| ChainError::BadInviteLink("bad block hash".into()))?;
        let seed = from_base64(parts[2]).map_err(|_| ChainError::BadInviteSeed)?;

        Ok(TeamInvite::new(initial_team_public_key, block_hash, seed))
    }
}

impl Drop for TeamInvite {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl std::fmt::Debug for TeamInvite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamInvite")
            .field("initial_team_public_key", &self.initial_team_public_key)
            .field("block_hash", &self.block_hash)
            .field("seed", &"<redacted>")
            .finish()
    }
}
