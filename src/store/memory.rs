//! In-memory [`TeamDataStore`], used by tests and short-lived tooling.

use crate::chain::block::Block;
use crate::chain::keys::{BlockHash, PublicKey};
use crate::chain::types::{MemberIdentity, SshHostKey, Team};

use super::{Result, StoreError, StoreMutation, TeamDataStore};

#[derive(Debug, Clone)]
struct LogEntry {
    block: Block,
    posted: bool,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    team: Option<Team>,
    blocks: Vec<Block>,
    members: Vec<MemberIdentity>,
    admins: Vec<PublicKey>,
    pinned_hosts: Vec<SshHostKey>,
    log_blocks: Vec<LogEntry>,
}

#[derive(Debug, Clone)]
pub struct MemoryTeamStore {
    team_id: String,
    tables: Tables,
}

impl MemoryTeamStore {
    pub fn new(team_id: impl Into<String>) -> Self {
        MemoryTeamStore {
            team_id: team_id.into(),
            tables: Tables::default(),
        }
    }

    pub fn block_count(&self) -> usize {
        self.tables.blocks.len()
    }
}

impl Tables {
    fn push_block(&mut self, block: &Block) -> Result<()> {
        let hash = block.hash();
        if self.blocks.iter().any(|b| b.hash() == hash) {
            return Err(StoreError::Conflict(format!("block {} exists", hash.short())));
        }
        self.blocks.push(block.clone());
        Ok(())
    }

    fn has_member(&self, public_key: &PublicKey) -> bool {
        self.members.iter().any(|m| &m.public_key == public_key)
    }

    fn add_member(&mut self, member: &MemberIdentity) -> Result<()> {
        if self.has_member(&member.public_key) {
            return Err(StoreError::Conflict(format!(
                "member {:?} exists",
                member.public_key
            )));
        }
        self.members.push(member.clone());
        Ok(())
    }

    fn apply(&mut self, mutation: &StoreMutation) -> Result<()> {
        match mutation {
            StoreMutation::CreateTeam {
                team,
                creator,
                block,
            } => {
                if self.team.is_some() || !self.blocks.is_empty() {
                    return Err(StoreError::Conflict("team already created".into()));
                }
                self.team = Some(team.clone());
                self.add_member(creator)?;
                self.admins.push(creator.public_key);
                self.push_block(block)
            }
            StoreMutation::SetTeam(team) => {
                if self.team.is_none() {
                    return Err(StoreError::NotFound("team".into()));
                }
                self.team = Some(team.clone());
                Ok(())
            }
            StoreMutation::AppendBlock(block) => self.push_block(block),
            StoreMutation::AddMember { member, block } => {
                self.add_member(member)?;
                self.push_block(block)
            }
            StoreMutation::RemoveMember { public_key, block } => {
                if !self.has_member(public_key) {
                    return Err(StoreError::NotFound(format!("member {:?}", public_key)));
                }
                self.members.retain(|m| &m.public_key != public_key);
                self.admins.retain(|a| a != public_key);
                self.push_block(block)
            }
            StoreMutation::AddAdmin { public_key, block } => {
                if !self.has_member(public_key) {
                    return Err(StoreError::NotFound(format!("member {:?}", public_key)));
                }
                if self.admins.contains(public_key) {
                    return Err(StoreError::Conflict(format!("admin {:?} exists", public_key)));
                }
                self.admins.push(*public_key);
                self.push_block(block)
            }
            StoreMutation::RemoveAdmin { public_key, block } => {
                if !self.admins.contains(public_key) {
                    return Err(StoreError::NotFound(format!("admin {:?}", public_key)));
                }
                self.admins.retain(|a| a != public_key);
                self.push_block(block)
            }
            StoreMutation::PinHostKey { host, block } => {
                if !self.pinned_hosts.contains(host) {
                    self.pinned_hosts.push(host.clone());
                }
                self.push_block(block)
            }
            StoreMutation::UnpinHostKey { host, block } => {
                self.pinned_hosts.retain(|h| h != host);
                self.push_block(block)
            }
            StoreMutation::AppendLogBlock(block) => {
                let hash = block.hash();
                if self.log_blocks.iter().any(|e| e.block.hash() == hash) {
                    return Err(StoreError::Conflict(format!(
                        "log block {} exists",
                        hash.short()
                    )));
                }
                self.log_blocks.push(LogEntry {
                    block: block.clone(),
                    posted: false,
                });
                Ok(())
            }
            StoreMutation::MarkLogBlockPosted(hash) => {
                let entry = self
                    .log_blocks
                    .iter_mut()
                    .find(|e| &e.block.hash() == hash)
                    .ok_or_else(|| StoreError::NotFound(format!("log block {}", hash.short())))?;
                entry.posted = true;
                Ok(())
            }
        }
    }
}

impl TeamDataStore for MemoryTeamStore {
    fn team_id(&self) -> &str {
        &self.team_id
    }

    fn fetch_team(&self) -> Result<Option<Team>> {
        Ok(self.tables.team.clone())
    }

    fn last_block_hash(&self) -> Result<Option<BlockHash>> {
        Ok(self.tables.blocks.last().map(Block::hash))
    }

    fn has_block(&self, hash: &BlockHash) -> Result<bool> {
        Ok(self.tables.blocks.iter().any(|b| &b.hash() == hash))
    }

    fn fetch_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.tables.blocks.clone())
    }

    fn is_admin(&self, public_key: &PublicKey) -> Result<bool> {
        Ok(self.tables.admins.contains(public_key))
    }

    fn fetch_member(&self, public_key: &PublicKey) -> Result<Option<MemberIdentity>> {
        Ok(self
            .tables
            .members
            .iter()
            .find(|m| &m.public_key == public_key)
            .cloned())
    }

    fn fetch_members(&self) -> Result<Vec<MemberIdentity>> {
        Ok(self.tables.members.clone())
    }

    fn fetch_admins(&self) -> Result<Vec<MemberIdentity>> {
        Ok(self
            .tables
            .admins
            .iter()
            .filter_map(|pk| self.tables.members.iter().find(|m| &m.public_key == pk))
            .cloned()
            .collect())
    }

    fn fetch_pinned_hosts(&self) -> Result<Vec<SshHostKey>> {
        Ok(self.tables.pinned_hosts.clone())
    }

    fn last_log_block_hash(&self) -> Result<Option<BlockHash>> {
        Ok(self.tables.log_blocks.last().map(|e| e.block.hash()))
    }

    fn fetch_log_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.tables.log_blocks.iter().map(|e| e.block.clone()).collect())
    }

    fn unposted_log_blocks(&self) -> Result<Vec<Block>> {
        Ok(self
            .tables
            .log_blocks
            .iter()
            .filter(|e| !e.posted)
            .map(|e| e.block.clone())
            .collect())
    }

    fn commit(&mut self, mutations: &[StoreMutation]) -> Result<()> {
        let mut staged = self.tables.clone();
        for mutation in mutations {
            staged.apply(mutation)?;
        }
        self.tables = staged;
        Ok(())
    }
}
