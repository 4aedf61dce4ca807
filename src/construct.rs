//! Block builders.
//!
//! Each builder links to the store's current tip and signs with the identity's
//! key. Nothing here touches the store except [`TeamIdentity::write_log_block`],
//! which appends to the local log chain.

use log::debug;

use crate::chain::block::{Block, Request};
use crate::chain::errors::{ChainError, Result};
use crate::chain::keys::{BlockHash, PublicKey};
use crate::chain::payload::{
    AppendBlock, AppendLogBlock, CreateChain, EncryptedLog, LogOperation, MemberInvitation,
    Operation, Payload, ReadBlocks, ReadLogBlocks, TeamPointer,
};
use crate::chain::types::{Info, LoggingEndpoint, MemberIdentity, PolicySettings, SshHostKey};
use crate::crypto::encryption::{encrypt_message, random_bytes};
use crate::crypto::signing::{SigningKeyPair, SEED_BYTES};
use crate::crypto::wrap::BoxKeyPair;
use crate::identity::{TeamIdentity, TeamInvite};
use crate::store::{StoreMutation, TeamDataStore};

/// Read requests carry a fresh nonce of this many bytes.
pub const READ_NONCE_BYTES: usize = 32;

fn sign_with(payload: &Payload, keypair: &SigningKeyPair) -> Result<Request> {
    Block::sign(payload, keypair).map_err(|_| ChainError::PayloadSignatureFailed)
}

fn unix_seconds() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// A signed `read_blocks` request starting at `pointer`.
pub fn read_blocks_request(pointer: TeamPointer, keypair: &SigningKeyPair) -> Result<Request> {
    let payload = Payload::ReadBlocks(ReadBlocks {
        team_pointer: pointer,
        nonce: random_bytes(READ_NONCE_BYTES)?,
        unix_seconds: unix_seconds(),
    });
    sign_with(&payload, keypair)
}

impl TeamIdentity {
    // -- identities --

    /// Found a new team. The creator's signing key becomes the team's genesis
    /// key; returns the identity and the signed `create_chain` block.
    pub fn new_admin(
        email: impl Into<String>,
        team_name: impl Into<String>,
        ssh_public_key: Vec<u8>,
        pgp_public_key: Vec<u8>,
    ) -> Result<(TeamIdentity, Block)> {
        let keypair = SigningKeyPair::generate();
        let team_public_key = PublicKey::from_bytes(keypair.public_key);

        let mut identity = TeamIdentity::with_keys(
            email,
            keypair,
            BoxKeyPair::generate(),
            team_public_key,
            BlockHash::from_bytes([0; 32]),
        );

        let payload = Payload::CreateChain(CreateChain {
            creator: identity.member_identity(ssh_public_key, pgp_public_key),
            team_info: Info::new(team_name),
        });
        let genesis = sign_with(&payload, identity.keypair())?;
        identity.checkpoint = genesis.hash();

        debug!("new team genesis {}", genesis.hash().short());
        Ok((identity, genesis))
    }

    /// A joining device's identity, anchored at the invite's block.
    pub fn new_member(email: impl Into<String>, invite: &TeamInvite) -> Result<TeamIdentity> {
        TeamIdentity::new(email, invite.initial_team_public_key, invite.block_hash)
    }

    // -- main chain --

    /// Sign `operation` as an `append_block` linked to the store's tip.
    pub fn signed_append_block<S: TeamDataStore>(
        &self,
        store: &S,
        operation: Operation,
    ) -> Result<Request> {
        let last_block_hash = store
            .last_block_hash()?
            .ok_or(ChainError::MissingLastBlockHash)?;
        let payload = Payload::AppendBlock(AppendBlock {
            last_block_hash,
            operation,
        });
        sign_with(&payload, self.keypair())
    }

    /// New invitation: a fresh nonce keypair whose public half goes on chain
    /// and whose seed goes in the returned invite link.
    pub fn invitation_block<S: TeamDataStore>(&self, store: &S) -> Result<(TeamInvite, Request)> {
        let seed = random_bytes(SEED_BYTES)?;
        let nonce = SigningKeyPair::from_seed(&seed).map_err(|_| ChainError::BadInviteSeed)?;

        let request = self.signed_append_block(
            store,
            Operation::InviteMember(MemberInvitation {
                nonce_public_key: PublicKey::from_bytes(nonce.public_key),
            }),
        )?;
        let invite = TeamInvite::new(self.initial_team_public_key, request.hash(), seed);
        Ok((invite, request))
    }

    pub fn cancel_invitation_block<S: TeamDataStore>(&self, store: &S) -> Result<Request> {
        let nonce_public_key = store
            .fetch_team()?
            .and_then(|team| team.last_invite_public_key)
            .ok_or(ChainError::NoActiveInvitation)?;
        self.signed_append_block(
            store,
            Operation::CancelInvite(MemberInvitation { nonce_public_key }),
        )
    }

    /// Accept `invite` as this device. Signed with the invite nonce key, not
    /// the device key.
    pub fn accept_invite_block<S: TeamDataStore>(
        &self,
        store: &S,
        invite: &TeamInvite,
        ssh_public_key: Vec<u8>,
        pgp_public_key: Vec<u8>,
    ) -> Result<Request> {
        let nonce = invite.nonce_keypair()?;
        let last_block_hash = store
            .last_block_hash()?
            .ok_or(ChainError::MissingLastBlockHash)?;
        let payload = Payload::AppendBlock(AppendBlock {
            last_block_hash,
            operation: Operation::AcceptInvite(self.member_identity(ssh_public_key, pgp_public_key)),
        });
        sign_with(&payload, &nonce)
    }

    pub fn add_member_block<S: TeamDataStore>(
        &self,
        store: &S,
        member: MemberIdentity,
    ) -> Result<Request> {
        self.signed_append_block(store, Operation::AddMember(member))
    }

    pub fn remove_member_block<S: TeamDataStore>(
        &self,
        store: &S,
        member_public_key: PublicKey,
    ) -> Result<Request> {
        if store.fetch_member(&member_public_key)?.is_none() {
            return Err(ChainError::MemberDoesNotExist);
        }
        self.signed_append_block(store, Operation::RemoveMember(member_public_key))
    }

    pub fn set_policy_block<S: TeamDataStore>(
        &self,
        store: &S,
        policy: PolicySettings,
    ) -> Result<Request> {
        self.signed_append_block(store, Operation::SetPolicy(policy))
    }

    pub fn set_team_info_block<S: TeamDataStore>(&self, store: &S, info: Info) -> Result<Request> {
        self.signed_append_block(store, Operation::SetTeamInfo(info))
    }

    pub fn pin_host_key_block<S: TeamDataStore>(
        &self,
        store: &S,
        host: SshHostKey,
    ) -> Result<Request> {
        self.signed_append_block(store, Operation::PinHostKey(host))
    }

    pub fn unpin_host_key_block<S: TeamDataStore>(
        &self,
        store: &S,
        host: SshHostKey,
    ) -> Result<Request> {
        self.signed_append_block(store, Operation::UnpinHostKey(host))
    }

    pub fn add_logging_endpoint_block<S: TeamDataStore>(
        &self,
        store: &S,
        endpoint: LoggingEndpoint,
    ) -> Result<Request> {
        self.signed_append_block(store, Operation::AddLoggingEndpoint(endpoint))
    }

    pub fn remove_logging_endpoint_block<S: TeamDataStore>(
        &self,
        store: &S,
        endpoint: LoggingEndpoint,
    ) -> Result<Request> {
        self.signed_append_block(store, Operation::RemoveLoggingEndpoint(endpoint))
    }

    pub fn add_admin_block<S: TeamDataStore>(
        &self,
        store: &S,
        member_public_key: PublicKey,
    ) -> Result<Request> {
        if store.fetch_member(&member_public_key)?.is_none() {
            return Err(ChainError::MemberDoesNotExist);
        }
        self.signed_append_block(store, Operation::AddAdmin(member_public_key))
    }

    pub fn remove_admin_block<S: TeamDataStore>(
        &self,
        store: &S,
        admin_public_key: PublicKey,
    ) -> Result<Request> {
        if !store.is_admin(&admin_public_key)? {
            return Err(ChainError::AdminDoesNotExist);
        }
        self.signed_append_block(store, Operation::RemoveAdmin(admin_public_key))
    }

    // -- reads --

    /// Read request signed by this device, continuing from the store's tip.
    pub fn read_blocks_request<S: TeamDataStore>(&self, store: &S) -> Result<Request> {
        read_blocks_request(self.team_pointer(store)?, self.keypair())
    }

    /// Read request for a member's log chain (`None`: this device's own).
    pub fn read_log_blocks_request<S: TeamDataStore>(
        &self,
        store: &S,
        member_public_key: Option<PublicKey>,
    ) -> Result<Request> {
        let payload = Payload::ReadLogBlocks(ReadLogBlocks {
            team_pointer: self.team_pointer(store)?,
            member_public_key,
            nonce: random_bytes(READ_NONCE_BYTES)?,
            unix_seconds: unix_seconds(),
        });
        sign_with(&payload, self.keypair())
    }

    // -- audit log --

    /// Seal `data` with the current log key and append it to this device's
    /// log chain as an unposted `encrypt_log` block.
    pub fn write_log_block<S: TeamDataStore>(&mut self, store: &mut S, data: &[u8]) -> Result<Block> {
        let team = store.fetch_team()?.ok_or(ChainError::MissingLastBlockHash)?;
        if !team.command_encrypted_logging_enabled() {
            return Err(ChainError::LoggingDisabled);
        }
        let last_block_hash = self
            .log_checkpoint
            .ok_or(ChainError::MissingLastLogBlockHash)?;
        let key = self
            .log_encryption_key
            .as_ref()
            .ok_or(ChainError::LogEncryptionFailed)?;

        let ciphertext =
            encrypt_message(data, key.as_bytes()).map_err(|_| ChainError::LogEncryptionFailed)?;
        let payload = Payload::AppendLogBlock(AppendLogBlock {
            last_block_hash,
            operation: LogOperation::EncryptLog(EncryptedLog { ciphertext }),
        });
        let block = sign_with(&payload, self.keypair())?;

        store.commit(&[StoreMutation::AppendLogBlock(block.clone())])?;
        self.log_checkpoint = Some(block.hash());
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encryption::decrypt_message;
    use crate::store::MemoryTeamStore;
    use crate::verify::verify_and_commit;

    fn founded() -> (TeamIdentity, MemoryTeamStore) {
        let (mut admin, genesis) =
            TeamIdentity::new_admin("root@acme.co", "Acme", vec![1, 2], vec![3]).unwrap();
        let mut store = MemoryTeamStore::new(admin.team_id.clone());
        verify_and_commit(&mut admin, &mut store, &[genesis]).unwrap();
        (admin, store)
    }

    #[test]
    fn test_new_admin_genesis() {
        let (admin, genesis) =
            TeamIdentity::new_admin("root@acme.co", "Acme", vec![1, 2], vec![3]).unwrap();
        assert_eq!(admin.initial_team_public_key, admin.public_key());
        assert_eq!(admin.checkpoint, genesis.hash());
        assert!(genesis.verify());

        let Payload::CreateChain(create) = genesis.decode_payload().unwrap() else {
            panic!("expected create_chain");
        };
        assert_eq!(create.team_info.name, "Acme");
        assert_eq!(create.creator.public_key, admin.public_key());
        assert_eq!(create.creator.ssh_public_key, vec![1, 2]);
    }

    #[test]
    fn test_append_needs_tip() {
        let (admin, _) = TeamIdentity::new_admin("root@acme.co", "Acme", vec![], vec![]).unwrap();
        let empty = MemoryTeamStore::new("t");
        assert!(matches!(
            admin.set_team_info_block(&empty, Info::new("x")),
            Err(ChainError::MissingLastBlockHash)
        ));
    }

    #[test]
    fn test_append_links_to_tip() {
        let (admin, store) = founded();
        let request = admin
            .set_policy_block(&store, PolicySettings::default())
            .unwrap();
        let Payload::AppendBlock(append) = request.decode_payload().unwrap() else {
            panic!("expected append_block");
        };
        assert_eq!(Some(append.last_block_hash), store.last_block_hash().unwrap());
        assert_eq!(request.public_key, admin.public_key());
        assert!(request.verify());
    }

    #[test]
    fn test_invite_link_matches_request() {
        let (admin, store) = founded();
        let (invite, request) = admin.invitation_block(&store).unwrap();
        assert_eq!(invite.block_hash, request.hash());
        assert_eq!(invite.initial_team_public_key, admin.initial_team_public_key);
        assert_eq!(invite.seed().len(), SEED_BYTES);

        let parsed = TeamInvite::parse(&invite.to_link()).unwrap();
        assert_eq!(parsed, invite);
    }

    #[test]
    fn test_cancel_without_invitation() {
        let (admin, store) = founded();
        assert!(matches!(
            admin.cancel_invitation_block(&store),
            Err(ChainError::NoActiveInvitation)
        ));
    }

    #[test]
    fn test_accept_with_bad_seed() {
        let (admin, store) = founded();
        let invite = TeamInvite::new(admin.initial_team_public_key, admin.checkpoint, vec![1, 2, 3]);
        let invitee = TeamIdentity::new_member("carol@acme.co", &invite).unwrap();
        assert!(matches!(
            invitee.accept_invite_block(&store, &invite, vec![], vec![]),
            Err(ChainError::BadInviteSeed)
        ));
    }

    #[test]
    fn test_member_and_admin_preconditions() {
        let (admin, store) = founded();
        let stranger = PublicKey::from_bytes([7; 32]);
        assert!(matches!(
            admin.remove_member_block(&store, stranger),
            Err(ChainError::MemberDoesNotExist)
        ));
        assert!(matches!(
            admin.add_admin_block(&store, stranger),
            Err(ChainError::MemberDoesNotExist)
        ));
        assert!(matches!(
            admin.remove_admin_block(&store, stranger),
            Err(ChainError::AdminDoesNotExist)
        ));
        assert!(admin.remove_admin_block(&store, admin.public_key()).is_ok());
    }

    #[test]
    fn test_read_request_pointer_and_nonce() {
        let (admin, store) = founded();
        let a = admin.read_blocks_request(&store).unwrap();
        let b = admin.read_blocks_request(&store).unwrap();
        let Payload::ReadBlocks(read) = a.decode_payload().unwrap() else {
            panic!("expected read_blocks");
        };
        assert_eq!(
            read.team_pointer,
            TeamPointer::LastBlockHash(store.last_block_hash().unwrap().unwrap())
        );
        assert_eq!(read.nonce.len(), READ_NONCE_BYTES);
        assert!(read.unix_seconds > 0);
        assert_ne!(a.payload, b.payload);
    }

    #[test]
    fn test_read_log_blocks_request() {
        let (admin, store) = founded();
        let request = admin.read_log_blocks_request(&store, None).unwrap();
        let Payload::ReadLogBlocks(read) = request.decode_payload().unwrap() else {
            panic!("expected read_log_blocks");
        };
        assert_eq!(read.member_public_key, None);
        assert!(request.verify());
    }

    #[test]
    fn test_write_log_requires_endpoint() {
        let (mut admin, mut store) = founded();
        assert!(matches!(
            admin.write_log_block(&mut store, b"ssh git@acme"),
            Err(ChainError::LoggingDisabled)
        ));
    }

    #[test]
    fn test_write_log_appends_encrypted_block() {
        let (mut admin, mut store) = founded();
        let block = admin
            .add_logging_endpoint_block(&store, LoggingEndpoint::CommandEncrypted {})
            .unwrap();
        verify_and_commit(&mut admin, &mut store, &[block]).unwrap();
        let chain_head = admin.log_checkpoint.unwrap();

        let log = admin.write_log_block(&mut store, b"ssh git@acme").unwrap();
        assert_eq!(admin.log_checkpoint, Some(log.hash()));
        assert_eq!(store.last_log_block_hash().unwrap(), Some(log.hash()));

        let Payload::AppendLogBlock(append) = log.decode_payload().unwrap() else {
            panic!("expected append_log_block");
        };
        assert_eq!(append.last_block_hash, chain_head);
        let LogOperation::EncryptLog(encrypted) = append.operation else {
            panic!("expected encrypt_log");
        };
        let key = admin.log_encryption_key.as_ref().unwrap();
        let plain = decrypt_message(&encrypted.ciphertext, key.as_bytes()).unwrap();
        assert_eq!(plain, b"ssh git@acme");
        assert!(!encrypted.ciphertext.windows(3).any(|w| w == b"ssh"));
    }
}
