//! Team data store contract.
//!
//! The durable store of blocks, members, admins, pinned hosts and log blocks
//! for one team is implemented by the application (SQLite, Core Data, ...). The
//! core reads through [`TeamDataStore`] and writes only by handing it a batch of
//! [`StoreMutation`]s produced by a successful fold, which the store applies
//! atomically: all of them or none.

pub mod memory;

use thiserror::Error;

use crate::chain::block::Block;
use crate::chain::keys::{BlockHash, PublicKey};
use crate::chain::types::{MemberIdentity, SshHostKey, Team};

pub use memory::MemoryTeamStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store conflict: {0}")]
    Conflict(String),
    #[error("Not found in store: {0}")]
    NotFound(String),
    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// A single durable write. Every main-chain block is persisted by exactly one
/// mutation carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMutation {
    /// Genesis: team state, creator as first member and admin, and the block.
    CreateTeam {
        team: Team,
        creator: MemberIdentity,
        block: Block,
    },
    /// Replace the projected team state.
    SetTeam(Team),
    /// Persist a block with no membership effect.
    AppendBlock(Block),
    AddMember {
        member: MemberIdentity,
        block: Block,
    },
    /// Removes the member and any admin status they held.
    RemoveMember {
        public_key: PublicKey,
        block: Block,
    },
    AddAdmin {
        public_key: PublicKey,
        block: Block,
    },
    RemoveAdmin {
        public_key: PublicKey,
        block: Block,
    },
    PinHostKey {
        host: SshHostKey,
        block: Block,
    },
    UnpinHostKey {
        host: SshHostKey,
        block: Block,
    },
    /// Append a locally built log-chain block, initially unposted.
    AppendLogBlock(Block),
    /// The team server accepted this log block.
    MarkLogBlockPosted(BlockHash),
}

impl StoreMutation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMutation::CreateTeam { .. } => "create_team",
            StoreMutation::SetTeam(_) => "set_team",
            StoreMutation::AppendBlock(_) => "append_block",
            StoreMutation::AddMember { .. } => "add_member",
            StoreMutation::RemoveMember { .. } => "remove_member",
            StoreMutation::AddAdmin { .. } => "add_admin",
            StoreMutation::RemoveAdmin { .. } => "remove_admin",
            StoreMutation::PinHostKey { .. } => "pin_host_key",
            StoreMutation::UnpinHostKey { .. } => "unpin_host_key",
            StoreMutation::AppendLogBlock(_) => "append_log_block",
            StoreMutation::MarkLogBlockPosted(_) => "mark_log_block_posted",
        }
    }

    /// The main-chain block this mutation persists, if any.
    pub fn chain_block(&self) -> Option<&Block> {
        match self {
            StoreMutation::CreateTeam { block, .. }
            | StoreMutation::AddMember { block, .. }
            | StoreMutation::RemoveMember { block, .. }
            | StoreMutation::AddAdmin { block, .. }
            | StoreMutation::RemoveAdmin { block, .. }
            | StoreMutation::PinHostKey { block, .. }
            | StoreMutation::UnpinHostKey { block, .. } => Some(block),
            StoreMutation::AppendBlock(block) => Some(block),
            StoreMutation::SetTeam(_)
            | StoreMutation::AppendLogBlock(_)
            | StoreMutation::MarkLogBlockPosted(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Store contract (app implements)
// ---------------------------------------------------------------------------

/// Per-team persistence.
///
/// Must be safe for single-writer, multiple-reader use; the core treats every
/// call as synchronous and blocking. Collections are returned in insertion
/// order.
pub trait TeamDataStore {
    fn team_id(&self) -> &str;

    /// Projected team state, `None` before genesis has been committed.
    fn fetch_team(&self) -> Result<Option<Team>>;

    /// Hash of the newest main-chain block.
    fn last_block_hash(&self) -> Result<Option<BlockHash>>;
    fn has_block(&self, hash: &BlockHash) -> Result<bool>;
    fn fetch_blocks(&self) -> Result<Vec<Block>>;

    fn is_admin(&self, public_key: &PublicKey) -> Result<bool>;
    fn fetch_member(&self, public_key: &PublicKey) -> Result<Option<MemberIdentity>>;
    fn fetch_members(&self) -> Result<Vec<MemberIdentity>>;
    fn fetch_admins(&self) -> Result<Vec<MemberIdentity>>;
    fn fetch_pinned_hosts(&self) -> Result<Vec<SshHostKey>>;

    /// Hash of the newest log-chain block.
    fn last_log_block_hash(&self) -> Result<Option<BlockHash>>;
    fn fetch_log_blocks(&self) -> Result<Vec<Block>>;
    /// Log blocks not yet accepted by the team server, oldest first.
    fn unposted_log_blocks(&self) -> Result<Vec<Block>>;

    /// Apply `mutations` in order, atomically.
    fn commit(&mut self, mutations: &[StoreMutation]) -> Result<()>;
}
