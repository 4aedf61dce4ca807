//! Chain verifier and state projector.
//!
//! [`verify_and_fold`] folds a sequence of blocks onto the committed chain tip
//! and returns the new team state together with the store writes that make it
//! durable. It never writes to the store itself: a fold either produces a
//! complete [`FoldOutcome`] or an error, and [`verify_and_commit`] hands the
//! outcome's mutations to the store in a single atomic commit.
//!
//! Per block, in order:
//! 1. the payload must be `append_block` (genesis aside)
//! 2. the signer must be a current admin, or the outstanding invite nonce key
//!    for `accept_invite`
//! 3. `last_block_hash` must equal the running tip
//! 4. the signature must verify over the raw payload bytes
//! 5. the operation is applied, including any audit-log side effects

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::chain::block::Block;
use crate::chain::errors::{ChainError, Result};
use crate::chain::keys::{BlockHash, BoxPublicKey, PublicKey, SecretBoxKey};
use crate::chain::payload::{
    AppendLogBlock, CreateLogChain, LogOperation, Operation, Payload, TeamPointer, WrappedKey,
};
use crate::chain::types::{LoggingEndpoint, MemberIdentity, Team};
use crate::crypto::encryption::generate_key;
use crate::crypto::wrap;
use crate::identity::{LogKeyState, TeamIdentity};
use crate::store::{StoreMutation, TeamDataStore};

/// Result of a successful fold, not yet committed.
#[derive(Debug, Clone)]
pub struct FoldOutcome {
    pub team: Team,
    pub last_block_hash: BlockHash,
    pub log_keys: LogKeyState,
    pub mutations: Vec<StoreMutation>,
}

// ---------------------------------------------------------------------------
// Staged view
// ---------------------------------------------------------------------------

/// Membership as seen mid-fold: the committed store plus this fold's pending
/// adds and removes.
struct StagedView<'a, S: TeamDataStore> {
    store: &'a S,
    added_members: Vec<MemberIdentity>,
    removed_members: HashSet<PublicKey>,
    added_admins: Vec<PublicKey>,
    removed_admins: HashSet<PublicKey>,
}

impl<'a, S: TeamDataStore> StagedView<'a, S> {
    fn new(store: &'a S) -> Self {
        StagedView {
            store,
            added_members: Vec::new(),
            removed_members: HashSet::new(),
            added_admins: Vec::new(),
            removed_admins: HashSet::new(),
        }
    }

    fn fetch_member(&self, public_key: &PublicKey) -> Result<Option<MemberIdentity>> {
        if let Some(member) = self.added_members.iter().find(|m| &m.public_key == public_key) {
            return Ok(Some(member.clone()));
        }
        if self.removed_members.contains(public_key) {
            return Ok(None);
        }
        Ok(self.store.fetch_member(public_key)?)
    }

    fn is_admin(&self, public_key: &PublicKey) -> Result<bool> {
        if self.added_admins.contains(public_key) {
            return Ok(true);
        }
        if self.removed_admins.contains(public_key) {
            return Ok(false);
        }
        Ok(self.store.is_admin(public_key)?)
    }

    fn fetch_admins(&self) -> Result<Vec<MemberIdentity>> {
        let mut admins: Vec<MemberIdentity> = self
            .store
            .fetch_admins()?
            .into_iter()
            .filter(|a| !self.removed_admins.contains(&a.public_key))
            .collect();
        for public_key in &self.added_admins {
            if admins.iter().any(|a| &a.public_key == public_key) {
                continue;
            }
            if let Some(member) = self.fetch_member(public_key)? {
                admins.push(member);
            }
        }
        Ok(admins)
    }

    fn add_member(&mut self, member: MemberIdentity) {
        self.removed_members.remove(&member.public_key);
        self.added_members.push(member);
    }

    fn remove_member(&mut self, public_key: &PublicKey) {
        self.added_members.retain(|m| &m.public_key != public_key);
        self.removed_members.insert(*public_key);
        self.remove_admin(public_key);
    }

    fn add_admin(&mut self, public_key: PublicKey) {
        self.removed_admins.remove(&public_key);
        self.added_admins.push(public_key);
    }

    fn remove_admin(&mut self, public_key: &PublicKey) {
        self.added_admins.retain(|a| a != public_key);
        self.removed_admins.insert(*public_key);
    }
}

// ---------------------------------------------------------------------------
// Fold
// ---------------------------------------------------------------------------

struct Fold<'a, S: TeamDataStore> {
    identity: &'a TeamIdentity,
    view: StagedView<'a, S>,
    team: Team,
    last_block_hash: BlockHash,
    log_keys: LogKeyState,
    mutations: Vec<StoreMutation>,
}

/// Verify `blocks` against the committed chain in `store` and project the
/// resulting team state. Nothing is written; see [`verify_and_commit`].
pub fn verify_and_fold<S: TeamDataStore>(
    identity: &TeamIdentity,
    store: &S,
    blocks: &[Block],
) -> Result<FoldOutcome> {
    let mut view = StagedView::new(store);
    let mut mutations = Vec::new();

    let (team, last_block_hash, start) = match store.last_block_hash()? {
        Some(hash) => {
            let team = store.fetch_team()?.ok_or(ChainError::MissingCreateChain)?;
            (team, hash, 0)
        }
        None => {
            let genesis = blocks.first().ok_or(ChainError::MissingCreateChain)?;
            let (team, creator) = verify_genesis(identity, genesis)?;
            view.add_member(creator.clone());
            view.add_admin(creator.public_key);
            mutations.push(StoreMutation::CreateTeam {
                team: team.clone(),
                creator,
                block: genesis.clone(),
            });
            debug!("genesis {} verified", genesis.hash().short());
            (team, genesis.hash(), 1)
        }
    };

    let mut fold = Fold {
        identity,
        view,
        team,
        last_block_hash,
        log_keys: identity.log_keys(),
        mutations,
    };

    for block in &blocks[start..] {
        fold.apply_block(block)?;
    }

    if !blocks.is_empty() {
        fold.mutations.push(StoreMutation::SetTeam(fold.team.clone()));
        info!(
            "folded {} block(s) for team {}, tip {}",
            blocks.len(),
            store.team_id(),
            fold.last_block_hash.short()
        );
    }

    Ok(FoldOutcome {
        team: fold.team,
        last_block_hash: fold.last_block_hash,
        log_keys: fold.log_keys,
        mutations: fold.mutations,
    })
}

/// Fold `blocks` and atomically commit the result. On success the identity's
/// log keys advance, and its checkpoint moves to the new tip once the old
/// checkpoint is in the store. On any error neither the store nor the identity
/// changes.
pub fn verify_and_commit<S: TeamDataStore>(
    identity: &mut TeamIdentity,
    store: &mut S,
    blocks: &[Block],
) -> Result<Team> {
    let outcome = verify_and_fold(identity, store, blocks).map_err(|e| {
        warn!("rejected {} block(s): {}", blocks.len(), e);
        e
    })?;
    store.commit(&outcome.mutations)?;

    if !blocks.is_empty() && store.has_block(&identity.checkpoint)? {
        identity.checkpoint = outcome.last_block_hash;
    }
    identity.set_log_keys(outcome.log_keys);
    Ok(outcome.team)
}

fn verify_genesis(identity: &TeamIdentity, block: &Block) -> Result<(Team, MemberIdentity)> {
    let Payload::CreateChain(create) = block.decode_payload()? else {
        return Err(ChainError::MissingCreateChain);
    };
    if !block.verify_with(&identity.initial_team_public_key) {
        return Err(ChainError::BadSignature);
    }
    if create.creator.public_key != identity.initial_team_public_key {
        return Err(ChainError::TeamPublicKeyMismatch);
    }
    Ok((Team::new(create.team_info), create.creator))
}

impl<'a, S: TeamDataStore> Fold<'a, S> {
    fn apply_block(&mut self, block: &Block) -> Result<()> {
        let Payload::AppendBlock(append) = block.decode_payload()? else {
            return Err(ChainError::UnexpectedBlock);
        };

        let signer = match (&append.operation, self.team.last_invite_public_key) {
            (Operation::AcceptInvite(_), Some(nonce_public_key)) => nonce_public_key,
            _ => {
                if !self.view.is_admin(&block.public_key)? {
                    return Err(ChainError::SignerNotAdmin);
                }
                block.public_key
            }
        };

        if !append.last_block_hash.ct_eq(&self.last_block_hash) {
            return Err(ChainError::BadBlockHash);
        }

        if !block.verify_with(&signer) {
            return Err(ChainError::BadSignature);
        }

        debug!(
            "applying {} at {}",
            append.operation.as_str(),
            block.hash().short()
        );
        self.apply_operation(append.operation, block)?;
        self.last_block_hash = block.hash();
        Ok(())
    }

    fn apply_operation(&mut self, operation: Operation, block: &Block) -> Result<()> {
        let block = block.clone();
        match operation {
            Operation::InviteMember(invite) => {
                self.team.last_invite_public_key = Some(invite.nonce_public_key);
                self.mutations.push(StoreMutation::AppendBlock(block));
            }
            Operation::CancelInvite(_) => {
                self.team.last_invite_public_key = None;
                self.mutations.push(StoreMutation::AppendBlock(block));
            }
            Operation::AcceptInvite(member) => {
                self.team.last_invite_public_key = None;
                self.add_member(member, block)?;
            }
            Operation::AddMember(member) => self.add_member(member, block)?,
            Operation::RemoveMember(public_key) => {
                if self.view.fetch_member(&public_key)?.is_none() {
                    return Err(ChainError::MemberDoesNotExist);
                }
                let was_admin = self.view.is_admin(&public_key)?;
                self.view.remove_member(&public_key);
                self.mutations
                    .push(StoreMutation::RemoveMember { public_key, block });

                if was_admin && self.log_keys.has_log_chain() {
                    self.rotate_log_key(&public_key)?;
                }
            }
            Operation::SetPolicy(policy) => {
                self.team.policy = policy;
                self.mutations.push(StoreMutation::AppendBlock(block));
            }
            Operation::SetTeamInfo(info) => {
                self.team.info = info;
                self.mutations.push(StoreMutation::AppendBlock(block));
            }
            Operation::PinHostKey(host) => {
                self.mutations.push(StoreMutation::PinHostKey { host, block });
            }
            Operation::UnpinHostKey(host) => {
                self.mutations.push(StoreMutation::UnpinHostKey { host, block });
            }
            Operation::AddLoggingEndpoint(endpoint) => {
                if !self.team.logging_endpoints.contains(&endpoint) {
                    self.team.logging_endpoints.push(endpoint);
                }
                let team_block_hash = block.hash();
                self.mutations.push(StoreMutation::AppendBlock(block));

                if !self.log_keys.has_log_chain() {
                    self.create_log_chain(team_block_hash)?;
                }
            }
            Operation::RemoveLoggingEndpoint(endpoint) => {
                remove_endpoint(&mut self.team, &endpoint);
                self.mutations.push(StoreMutation::AppendBlock(block));
            }
            Operation::AddAdmin(public_key) => {
                let member = self
                    .view
                    .fetch_member(&public_key)?
                    .ok_or(ChainError::MemberDoesNotExist)?;
                if self.view.is_admin(&public_key)? {
                    return Err(ChainError::AdminAlreadyExists);
                }
                self.view.add_admin(public_key);
                self.mutations
                    .push(StoreMutation::AddAdmin { public_key, block });

                if self.log_keys.has_log_chain() {
                    self.share_log_key(&member)?;
                }
            }
            Operation::RemoveAdmin(public_key) => {
                if !self.view.is_admin(&public_key)? {
                    return Err(ChainError::AdminDoesNotExist);
                }
                self.view.remove_admin(&public_key);
                self.mutations
                    .push(StoreMutation::RemoveAdmin { public_key, block });

                if self.log_keys.has_log_chain() {
                    self.rotate_log_key(&public_key)?;
                }
            }
        }
        Ok(())
    }

    fn add_member(&mut self, member: MemberIdentity, block: Block) -> Result<()> {
        if self.view.fetch_member(&member.public_key)?.is_some() {
            return Err(ChainError::MemberAlreadyExists);
        }
        self.view.add_member(member.clone());
        self.mutations.push(StoreMutation::AddMember { member, block });
        Ok(())
    }

    // -- audit log side effects --

    fn create_log_chain(&mut self, team_block_hash: BlockHash) -> Result<()> {
        let key = match self.log_keys.encryption_key.clone() {
            Some(key) => key,
            None => SecretBoxKey::from_bytes(generate_key()?),
        };
        let admins = self.view.fetch_admins()?;
        let wrapped_keys = wrap_to_recipients(&key, &admins, self.identity.encryption_public_key())?;

        let payload = Payload::CreateLogChain(CreateLogChain {
            team_pointer: TeamPointer::LastBlockHash(team_block_hash),
            wrapped_keys,
        });
        self.log_keys.encryption_key = Some(key);
        self.push_log_block(&payload)?;
        info!("created log chain for team {}", self.view.store.team_id());
        Ok(())
    }

    fn share_log_key(&mut self, admin: &MemberIdentity) -> Result<()> {
        let key = self
            .log_keys
            .encryption_key
            .clone()
            .ok_or(ChainError::LogEncryptionFailed)?;
        let wrapped = WrappedKey {
            public_key: admin.encryption_public_key,
            ciphertext: wrap::wrap(key.as_bytes(), admin.encryption_public_key.as_bytes())?,
        };
        self.append_log_operation(LogOperation::AddWrappedKeys(vec![wrapped]))
    }

    fn rotate_log_key(&mut self, removed: &PublicKey) -> Result<()> {
        let key = SecretBoxKey::from_bytes(generate_key()?);
        let remaining: Vec<MemberIdentity> = self
            .view
            .fetch_admins()?
            .into_iter()
            .filter(|a| &a.public_key != removed)
            .collect();
        let wrapped_keys =
            wrap_to_recipients(&key, &remaining, self.identity.encryption_public_key())?;

        self.log_keys.encryption_key = Some(key);
        self.append_log_operation(LogOperation::RotateKey(wrapped_keys))?;
        info!("rotated log key after removing {:?}", removed);
        Ok(())
    }

    fn append_log_operation(&mut self, operation: LogOperation) -> Result<()> {
        let last_block_hash = self
            .log_keys
            .checkpoint
            .ok_or(ChainError::MissingLastLogBlockHash)?;
        let payload = Payload::AppendLogBlock(AppendLogBlock {
            last_block_hash,
            operation,
        });
        self.push_log_block(&payload)
    }

    fn push_log_block(&mut self, payload: &Payload) -> Result<()> {
        let log_block =
            Block::sign(payload, self.identity.keypair()).map_err(|_| ChainError::PayloadSignatureFailed)?;
        self.log_keys.checkpoint = Some(log_block.hash());
        self.mutations.push(StoreMutation::AppendLogBlock(log_block));
        Ok(())
    }
}

fn remove_endpoint(team: &mut Team, endpoint: &LoggingEndpoint) {
    team.logging_endpoints.retain(|e| e != endpoint);
}

/// Wrap `key` to every admin and to `own`, one entry per distinct
/// encryption key, admins first.
pub(crate) fn wrap_to_recipients(
    key: &SecretBoxKey,
    admins: &[MemberIdentity],
    own: BoxPublicKey,
) -> Result<Vec<WrappedKey>> {
    let mut recipients: Vec<BoxPublicKey> = Vec::with_capacity(admins.len() + 1);
    for recipient in admins.iter().map(|a| a.encryption_public_key).chain(Some(own)) {
        if !recipients.contains(&recipient) {
            recipients.push(recipient);
        }
    }

    recipients
        .into_iter()
        .map(|public_key| -> Result<WrappedKey> {
            Ok(WrappedKey {
                public_key,
                ciphertext: wrap::wrap(key.as_bytes(), public_key.as_bytes())?,
            })
        })
        .collect()
}
