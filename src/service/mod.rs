//! Team service orchestrator.
//!
//! Drives read and append round trips against the team server. Every public
//! entry point holds the service lock for its whole (possibly multi-request)
//! duration, so two local operations can never race on the chain tip. The
//! lock is a scoped guard and is released on every return path.
//!
//! Reads loop page by page, folding each page before requesting the next.
//! Mutations are posted first and folded only after the server accepts them.
//! A rejected append usually means another device moved the tip: the service
//! re-reads the chain, rebuilds the block on the new tip and posts again, up
//! to `main_chain_retries` times.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`TeamServer`] | Blocking request/response transport |
//! | [`TeamService`] | Synchronous orchestrator |
//! | `AsyncTeamService` | Same flows over an async transport (feature `native`) |
//! | `HttpTeamServer`, `AsyncHttpTeamServer` | reqwest transports (feature `network`) |

#[cfg(feature = "native")]
pub mod async_service;
#[cfg(feature = "network")]
pub mod http;
#[cfg(test)]
pub(crate) mod mock;

#[cfg(feature = "native")]
pub use async_service::{AsyncTeamServer, AsyncTeamService};
#[cfg(feature = "network")]
pub use http::HttpTeamServer;
#[cfg(all(feature = "network", feature = "native"))]
pub use http::AsyncHttpTeamServer;

use std::sync::{Mutex, MutexGuard};

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::block::{Block, ReadResponse, Request, ServerResponse};
use crate::chain::errors::ChainError;
use crate::chain::keys::{BlockHash, PublicKey};
use crate::chain::limits::{DEFAULT_MAIN_CHAIN_RETRIES, DEFAULT_MAX_READ_PAGES};
use crate::chain::payload::{Operation, TeamPointer};
use crate::chain::types::{MemberIdentity, SshHostKey, Team};
use crate::construct::read_blocks_request;
use crate::identity::{TeamIdentity, TeamInvite};
use crate::store::{StoreError, StoreMutation, TeamDataStore};
use crate::verify::verify_and_commit;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Request timed out")]
    Timeout,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Server responded with: {message}")]
    Server { message: String },
    #[error("Bad server response: {0}")]
    BadResponse(String),
    #[error("No local chain; fetch the newest block first")]
    NeedNewestBlock,
    #[error("Server reported no new blocks before the local checkpoint was reached")]
    CheckpointNotReached,
    #[error("Block was not accepted by the server: {0}")]
    BlockDidNotPost(String),
    #[error("Read did not finish within {0} pages")]
    TooManyPages(usize),
    #[error("Service lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, ServiceError>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TeamServiceConfig {
    /// Team server URL, used by the HTTP transports.
    pub endpoint: String,
    /// Upper bound on pages requested by one read loop.
    pub max_read_pages: usize,
    /// Refresh-and-repost attempts after a rejected append.
    pub main_chain_retries: usize,
    pub request_timeout_secs: u64,
}

impl Default for TeamServiceConfig {
    fn default() -> Self {
        TeamServiceConfig {
            endpoint: "https://api.krypt.co".to_string(),
            max_read_pages: DEFAULT_MAX_READ_PAGES,
            main_chain_retries: DEFAULT_MAIN_CHAIN_RETRIES,
            request_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport contract
// ---------------------------------------------------------------------------

/// A reliable request/response channel to the team server. Takes the JSON
/// request body and returns the JSON response body.
pub trait TeamServer {
    fn send(&self, body: &str) -> std::result::Result<String, TransportError>;
}

impl<T: TeamServer + ?Sized> TeamServer for &T {
    fn send(&self, body: &str) -> std::result::Result<String, TransportError> {
        (**self).send(body)
    }
}

impl<T: TeamServer + ?Sized> TeamServer for std::sync::Arc<T> {
    fn send(&self, body: &str) -> std::result::Result<String, TransportError> {
        (**self).send(body)
    }
}

// ---------------------------------------------------------------------------
// Shared steps (sync and async services)
// ---------------------------------------------------------------------------

pub(crate) struct ServiceState<S> {
    pub(crate) identity: TeamIdentity,
    pub(crate) store: S,
}

/// How to catch up before reposting a rejected append: with the device key,
/// or, before joining, with the invite nonce key.
#[derive(Clone, Copy)]
pub(crate) enum Refresh<'a> {
    Member,
    Invite(&'a TeamInvite),
}

/// Whether a read loop should request another page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadStep {
    More,
    Done,
}

pub(crate) fn encode_request(request: &Request) -> Result<String> {
    serde_json::to_string(request).map_err(|e| ServiceError::BadResponse(e.to_string()))
}

pub(crate) fn decode_read(body: &str) -> Result<ReadResponse> {
    let response = ServerResponse::<ReadResponse>::from_json(body)
        .map_err(|e| ServiceError::BadResponse(e.to_string()))?;
    match response.into_result() {
        Ok(page) => {
            page.check_size()?;
            Ok(page)
        }
        Err(message) => {
            log::warn!("team server read error: {}", message);
            Err(ServiceError::Server { message })
        }
    }
}

/// Decode the reply to a posted block. An error envelope means the block was
/// not appended.
pub(crate) fn decode_post(body: &str) -> Result<()> {
    let response = ServerResponse::<IgnoredAny>::from_json(body)
        .map_err(|e| ServiceError::BadResponse(e.to_string()))?;
    response.into_result().map(|_| ()).map_err(|message| {
        log::warn!("team server rejected block: {}", message);
        ServiceError::BlockDidNotPost(message)
    })
}

/// Where the next page starts. Before any block is stored, reads are rooted at
/// `genesis` (the team public key).
pub(crate) fn read_pointer<S: TeamDataStore>(
    state: &ServiceState<S>,
    genesis: PublicKey,
) -> Result<TeamPointer> {
    Ok(match state.store.last_block_hash()? {
        Some(hash) => TeamPointer::LastBlockHash(hash),
        None => TeamPointer::PublicKey(genesis),
    })
}

/// Fold one page. An empty page, or the last page, must leave the identity's
/// checkpoint in the store.
pub(crate) fn fold_page<S: TeamDataStore>(
    state: &mut ServiceState<S>,
    page: ReadResponse,
) -> Result<ReadStep> {
    if page.blocks.is_empty() {
        return check_checkpoint(state).map(|_| ReadStep::Done);
    }

    log::debug!("folding page of {} block(s)", page.blocks.len());
    verify_and_commit(&mut state.identity, &mut state.store, &page.blocks)?;

    if page.more {
        Ok(ReadStep::More)
    } else {
        check_checkpoint(state).map(|_| ReadStep::Done)
    }
}

fn check_checkpoint<S: TeamDataStore>(state: &ServiceState<S>) -> Result<()> {
    if !state.identity.is_checkpoint_reached(&state.store)? {
        return Err(ServiceError::CheckpointNotReached);
    }
    Ok(())
}

/// Fold a block the server has just accepted.
pub(crate) fn fold_posted<S: TeamDataStore>(state: &mut ServiceState<S>, block: &Block) -> Result<Team> {
    let team = verify_and_commit(&mut state.identity, &mut state.store, std::slice::from_ref(block))?;
    log::info!("posted block {}", block.hash().short());
    Ok(team)
}

/// Decide whether a failed post should be retried after a refresh.
pub(crate) fn should_retry(error: &ServiceError, attempt: usize, retries: usize) -> bool {
    match error {
        ServiceError::BlockDidNotPost(message) if attempt < retries => {
            log::info!(
                "append rejected ({}), refreshing chain and retrying ({}/{})",
                message,
                attempt + 1,
                retries
            );
            true
        }
        _ => false,
    }
}

pub(crate) fn require_team<S: TeamDataStore>(state: &ServiceState<S>) -> Result<Team> {
    state
        .store
        .fetch_team()?
        .ok_or(ServiceError::NeedNewestBlock)
}

pub(crate) fn require_tip<S: TeamDataStore>(state: &ServiceState<S>) -> Result<BlockHash> {
    state
        .store
        .last_block_hash()?
        .ok_or(ServiceError::NeedNewestBlock)
}

pub(crate) fn check_invite_reached<S: TeamDataStore>(
    state: &ServiceState<S>,
    invite: &TeamInvite,
) -> Result<()> {
    if !state.store.has_block(&invite.block_hash)? {
        return Err(ChainError::InviteKeyMismatch.into());
    }
    Ok(())
}

pub(crate) fn mark_posted<S: TeamDataStore>(state: &mut ServiceState<S>, block: &Block) -> Result<()> {
    state
        .store
        .commit(&[StoreMutation::MarkLogBlockPosted(block.hash())])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Synchronous service
// ---------------------------------------------------------------------------

/// Owns one local identity and its store, and serializes every operation on
/// them.
pub struct TeamService<S: TeamDataStore, T: TeamServer> {
    state: Mutex<ServiceState<S>>,
    server: T,
    config: TeamServiceConfig,
}

impl<S: TeamDataStore, T: TeamServer> TeamService<S, T> {
    pub fn new(identity: TeamIdentity, store: S, server: T, config: TeamServiceConfig) -> Self {
        TeamService {
            state: Mutex::new(ServiceState { identity, store }),
            server,
            config,
        }
    }

    pub fn config(&self) -> &TeamServiceConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, ServiceState<S>>> {
        self.state.lock().map_err(|_| ServiceError::LockPoisoned)
    }

    fn post(&self, request: &Request) -> Result<()> {
        let body = self.server.send(&encode_request(request)?)?;
        decode_post(&body)
    }

    fn read_loop<F>(&self, state: &mut ServiceState<S>, make_request: F) -> Result<Team>
    where
        F: Fn(&ServiceState<S>) -> Result<Request>,
    {
        for _ in 0..self.config.max_read_pages {
            let request = make_request(&*state)?;
            let body = self.server.send(&encode_request(&request)?)?;
            let page = decode_read(&body)?;
            if fold_page(state, page)? == ReadStep::Done {
                return require_team(state);
            }
        }
        Err(ServiceError::TooManyPages(self.config.max_read_pages))
    }

    fn post_and_fold(&self, state: &mut ServiceState<S>, request: Request) -> Result<Team> {
        self.post(&request)?;
        fold_posted(state, &request)
    }

    /// Build, post and fold an append. When the server rejects it, catch up
    /// with `refresh` and rebuild on the new tip. A rejected block is never
    /// folded.
    fn append_with_retry<X, F>(
        &self,
        state: &mut ServiceState<S>,
        refresh: Refresh<'_>,
        build: F,
    ) -> Result<(X, Team)>
    where
        F: Fn(&ServiceState<S>) -> Result<(X, Request)>,
    {
        let mut attempt = 0;
        loop {
            let (extra, request) = build(state)?;
            match self.post(&request) {
                Ok(()) => return Ok((extra, fold_posted(state, &request)?)),
                Err(e) if should_retry(&e, attempt, self.config.main_chain_retries) => {
                    attempt += 1;
                    self.refresh(state, refresh)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn refresh(&self, state: &mut ServiceState<S>, refresh: Refresh<'_>) -> Result<Team> {
        match refresh {
            Refresh::Member => self.fetch_updates(state),
            Refresh::Invite(invite) => self.fetch_with_invite(state, invite),
        }
    }

    fn fetch_with_invite(&self, state: &mut ServiceState<S>, invite: &TeamInvite) -> Result<Team> {
        let nonce = invite.nonce_keypair()?;
        let team = self.read_loop(state, |state| {
            let pointer = read_pointer(state, invite.initial_team_public_key)?;
            Ok(read_blocks_request(pointer, &nonce)?)
        })?;
        check_invite_reached(state, invite)?;
        Ok(team)
    }

    fn fetch_updates(&self, state: &mut ServiceState<S>) -> Result<Team> {
        self.read_loop(state, |state| {
            Ok(state.identity.read_blocks_request(&state.store)?)
        })
    }

    // -- creation and reads --

    /// Post a genesis block and fold it once the server accepts it.
    pub fn create_team(&self, genesis: Block) -> Result<Team> {
        let mut state = self.lock()?;
        self.post_and_fold(&mut state, genesis)
    }

    /// Fetch the team as an invitee, signing reads with the invite nonce key.
    pub fn get_team(&self, invite: &TeamInvite) -> Result<Team> {
        let mut state = self.lock()?;
        self.fetch_with_invite(&mut state, invite)
    }

    /// Fetch and fold everything after the local tip.
    pub fn get_verified_team_updates(&self) -> Result<Team> {
        let mut state = self.lock()?;
        self.fetch_updates(&mut state)
    }

    // -- mutations --

    /// Post a new invitation; returns the invite to share out of band.
    pub fn invite(&self) -> Result<TeamInvite> {
        let mut state = self.lock()?;
        let (invite, _) = self.append_with_retry(&mut state, Refresh::Member, |state| {
            Ok(state.identity.invitation_block(&state.store)?)
        })?;
        Ok(invite)
    }

    pub fn cancel_invite(&self) -> Result<Team> {
        let mut state = self.lock()?;
        let ((), team) = self.append_with_retry(&mut state, Refresh::Member, |state| {
            Ok(((), state.identity.cancel_invitation_block(&state.store)?))
        })?;
        Ok(team)
    }

    /// Join via `invite`. The chain must already be fetched with [`get_team`].
    ///
    /// [`get_team`]: TeamService::get_team
    pub fn accept_invite(
        &self,
        invite: &TeamInvite,
        ssh_public_key: Vec<u8>,
        pgp_public_key: Vec<u8>,
    ) -> Result<Team> {
        let mut state = self.lock()?;
        require_tip(&state)?;
        let ((), team) = self.append_with_retry(&mut state, Refresh::Invite(invite), |state| {
            let request = state.identity.accept_invite_block(
                &state.store,
                invite,
                ssh_public_key.clone(),
                pgp_public_key.clone(),
            )?;
            Ok(((), request))
        })?;
        Ok(team)
    }

    /// Add a member directly, without an invitation.
    pub fn add_member(&self, member: MemberIdentity) -> Result<Team> {
        let mut state = self.lock()?;
        require_tip(&state)?;
        let ((), team) = self.append_with_retry(&mut state, Refresh::Member, |state| {
            Ok(((), state.identity.add_member_block(&state.store, member.clone())?))
        })?;
        Ok(team)
    }

    /// Post any admin-signed operation.
    pub fn response_for(&self, operation: Operation) -> Result<Team> {
        let mut state = self.lock()?;
        require_tip(&state)?;
        let ((), team) = self.append_with_retry(&mut state, Refresh::Member, |state| {
            Ok(((), state.identity.signed_append_block(&state.store, operation.clone())?))
        })?;
        Ok(team)
    }

    // -- audit log --

    /// Append an encrypted log entry to the local log chain. Not sent until
    /// [`send_unsent_log_blocks`](TeamService::send_unsent_log_blocks).
    pub fn write_log(&self, data: &[u8]) -> Result<Block> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        Ok(state.identity.write_log_block(&mut state.store, data)?)
    }

    /// Post unsent log blocks oldest first, marking each posted as the server
    /// accepts it. Stops at the first rejection.
    pub fn send_unsent_log_blocks(&self) -> Result<usize> {
        let mut state = self.lock()?;
        let unsent = state.store.unposted_log_blocks()?;
        for block in &unsent {
            self.post(block)?;
            mark_posted(&mut state, block)?;
        }
        if !unsent.is_empty() {
            log::info!("sent {} log block(s)", unsent.len());
        }
        Ok(unsent.len())
    }

    // -- accessors --

    pub fn team(&self) -> Result<Option<Team>> {
        Ok(self.lock()?.store.fetch_team()?)
    }

    pub fn identity(&self) -> Result<TeamIdentity> {
        Ok(self.lock()?.identity.clone())
    }

    pub fn members(&self) -> Result<Vec<MemberIdentity>> {
        Ok(self.lock()?.store.fetch_members()?)
    }

    pub fn admins(&self) -> Result<Vec<MemberIdentity>> {
        Ok(self.lock()?.store.fetch_admins()?)
    }

    pub fn pinned_hosts(&self) -> Result<Vec<SshHostKey>> {
        Ok(self.lock()?.store.fetch_pinned_hosts()?)
    }

    pub fn is_admin(&self) -> Result<bool> {
        let state = self.lock()?;
        Ok(state.store.is_admin(&state.identity.public_key())?)
    }

    /// Consume the service, returning the identity and store.
    pub fn into_parts(self) -> Result<(TeamIdentity, S)> {
        let state = self
            .state
            .into_inner()
            .map_err(|_| ServiceError::LockPoisoned)?;
        Ok((state.identity, state.store))
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTeamServer;
    use super::*;
    use crate::chain::payload::{LogOperation, Payload};
    use crate::chain::types::{Info, LoggingEndpoint, PolicySettings};
    use crate::store::MemoryTeamStore;

    fn service_for<'a>(
        identity: TeamIdentity,
        server: &'a MockTeamServer,
    ) -> TeamService<MemoryTeamStore, &'a MockTeamServer> {
        let store = MemoryTeamStore::new(identity.team_id.clone());
        TeamService::new(identity, store, server, TeamServiceConfig::default())
    }

    fn created(server: &MockTeamServer) -> TeamService<MemoryTeamStore, &MockTeamServer> {
        let (admin, genesis) =
            TeamIdentity::new_admin("root@acme.co", "Acme", vec![1], vec![2]).unwrap();
        let service = service_for(admin, server);
        service.create_team(genesis).unwrap();
        service
    }

    #[test]
    fn test_create_team_and_rename() {
        let server = MockTeamServer::new(10);
        let service = created(&server);
        assert_eq!(service.team().unwrap().unwrap().name(), "Acme");
        assert!(service.is_admin().unwrap());

        let team = service
            .response_for(Operation::SetTeamInfo(Info::new("Acme2")))
            .unwrap();
        assert_eq!(team.name(), "Acme2");
        assert_eq!(server.block_count(), 2);
    }

    #[test]
    fn test_rejected_post_is_not_folded() {
        let server = MockTeamServer::new(10);
        let service = created(&server);
        server.set_reject_appends(true);

        let err = service
            .response_for(Operation::SetTeamInfo(Info::new("Acme2")))
            .unwrap_err();
        assert!(matches!(err, ServiceError::BlockDidNotPost(_)));
        assert_eq!(service.team().unwrap().unwrap().name(), "Acme");
        assert_eq!(server.block_count(), 1);
        // One refresh per retry before giving up.
        assert_eq!(server.read_count(), DEFAULT_MAIN_CHAIN_RETRIES);
    }

    #[test]
    fn test_no_retries_fails_without_refresh() {
        let server = MockTeamServer::new(10);
        let (admin, genesis) =
            TeamIdentity::new_admin("root@acme.co", "Acme", vec![], vec![]).unwrap();
        let store = MemoryTeamStore::new(admin.team_id.clone());
        let config = TeamServiceConfig {
            main_chain_retries: 0,
            ..TeamServiceConfig::default()
        };
        let service = TeamService::new(admin, store, &server, config);
        service.create_team(genesis).unwrap();

        server.set_reject_appends(true);
        assert!(matches!(
            service.invite(),
            Err(ServiceError::BlockDidNotPost(_))
        ));
        assert_eq!(server.read_count(), 0);
    }

    #[test]
    fn test_stale_tip_is_refreshed_and_reposted() {
        let server = MockTeamServer::new(10);
        let (admin, genesis) =
            TeamIdentity::new_admin("root@acme.co", "Acme", vec![], vec![]).unwrap();

        // Two devices holding the same admin identity.
        let device_a = service_for(admin.clone(), &server);
        let device_b = service_for(admin, &server);
        device_a.create_team(genesis).unwrap();
        device_b.get_verified_team_updates().unwrap();

        device_a
            .response_for(Operation::SetTeamInfo(Info::new("FromA")))
            .unwrap();
        let team = device_b
            .response_for(Operation::SetTeamInfo(Info::new("FromB")))
            .unwrap();
        assert_eq!(team.name(), "FromB");
        assert_eq!(server.block_count(), 3);

        let team = device_a.get_verified_team_updates().unwrap();
        assert_eq!(team.name(), "FromB");
        assert_eq!(
            device_a.identity().unwrap().checkpoint,
            device_b.identity().unwrap().checkpoint
        );
    }

    #[test]
    fn test_accept_refreshes_with_invite_key() {
        let server = MockTeamServer::new(10);
        let admin = created(&server);
        let invite = admin.invite().unwrap();

        let joiner = service_for(TeamIdentity::new_member("c@acme.co", &invite).unwrap(), &server);
        joiner.get_team(&invite).unwrap();

        // The chain moves on before the invitee accepts.
        admin
            .response_for(Operation::SetTeamInfo(Info::new("Acme2")))
            .unwrap();

        let team = joiner.accept_invite(&invite, vec![], vec![]).unwrap();
        assert_eq!(team.name(), "Acme2");
        assert_eq!(team.last_invite_public_key, None);
        assert_eq!(server.block_count(), 4);
    }

    #[test]
    fn test_mutation_without_chain_needs_newest_block() {
        let server = MockTeamServer::new(10);
        let (admin, _) = TeamIdentity::new_admin("root@acme.co", "Acme", vec![], vec![]).unwrap();
        let service = service_for(admin, &server);
        assert!(matches!(
            service.response_for(Operation::SetPolicy(PolicySettings::default())),
            Err(ServiceError::NeedNewestBlock)
        ));
    }

    #[test]
    fn test_invite_join_and_paginated_fetch() {
        let server = MockTeamServer::new(2);
        let admin = created(&server);
        for name in ["A1", "A2", "A3"] {
            admin.response_for(Operation::SetTeamInfo(Info::new(name))).unwrap();
        }
        let invite = admin.invite().unwrap();
        let link = invite.to_link();

        // Joining device: parse the link, read the whole chain, accept.
        let invite = TeamInvite::parse(&link).unwrap();
        let invitee = TeamIdentity::new_member("carol@acme.co", &invite).unwrap();
        let carol_pk = invitee.public_key();
        let joiner = service_for(invitee, &server);

        let team = joiner.get_team(&invite).unwrap();
        assert_eq!(team.name(), "A3");
        assert!(team.last_invite_public_key.is_some());
        // 5 blocks in pages of 2
        assert_eq!(server.read_count(), 3);

        let team = joiner.accept_invite(&invite, vec![7], vec![8]).unwrap();
        assert_eq!(team.last_invite_public_key, None);
        assert!(joiner.members().unwrap().iter().any(|m| m.public_key == carol_pk));

        // Admin catches up on the accept.
        let team = admin.get_verified_team_updates().unwrap();
        assert_eq!(team.last_invite_public_key, None);
        assert_eq!(admin.members().unwrap().len(), 2);
    }

    #[test]
    fn test_updates_with_nothing_new() {
        let server = MockTeamServer::new(10);
        let service = created(&server);
        let team = service.get_verified_team_updates().unwrap();
        assert_eq!(team.name(), "Acme");
    }

    #[test]
    fn test_checkpoint_not_reached_on_empty_page() {
        let server = MockTeamServer::new(10);
        let admin = created(&server);
        let invite = admin.invite().unwrap();

        let joiner = service_for(TeamIdentity::new_member("c@acme.co", &invite).unwrap(), &server);
        server.set_stall_reads(true);
        assert!(matches!(
            joiner.get_team(&invite),
            Err(ServiceError::CheckpointNotReached)
        ));
    }

    #[test]
    fn test_checkpoint_not_reached_on_truncated_chain() {
        let server = MockTeamServer::new(10);
        let admin = created(&server);
        let invite = admin.invite().unwrap();

        // Server withholds the invite block and claims there is nothing more.
        server.set_withhold_tail(1);
        let joiner = service_for(TeamIdentity::new_member("c@acme.co", &invite).unwrap(), &server);
        assert!(matches!(
            joiner.get_team(&invite),
            Err(ServiceError::CheckpointNotReached)
        ));
    }

    #[test]
    fn test_page_bound() {
        let server = MockTeamServer::new(1);
        let admin = created(&server);
        for name in ["A1", "A2", "A3"] {
            admin.response_for(Operation::SetTeamInfo(Info::new(name))).unwrap();
        }
        let (identity, _) = admin.into_parts().unwrap();

        let reader = TeamService::new(
            TeamIdentity::new(
                "viewer@acme.co",
                identity.initial_team_public_key,
                identity.checkpoint,
            )
            .unwrap(),
            MemoryTeamStore::new("t"),
            &server,
            TeamServiceConfig {
                max_read_pages: 2,
                ..TeamServiceConfig::default()
            },
        );
        assert!(matches!(
            reader.get_verified_team_updates(),
            Err(ServiceError::TooManyPages(2))
        ));
    }

    #[test]
    fn test_server_error_envelope() {
        let server = MockTeamServer::new(10);
        let (admin, _) = TeamIdentity::new_admin("root@acme.co", "Acme", vec![], vec![]).unwrap();
        let service = service_for(admin, &server);
        match service.get_verified_team_updates() {
            Err(ServiceError::Server { message }) => assert!(message.contains("not found")),
            other => panic!("expected server error, got {:?}", other.map(|t| t.info)),
        }
    }

    #[test]
    fn test_tampered_server_chain_rejected() {
        let server = MockTeamServer::new(10);
        let admin = created(&server);
        admin.response_for(Operation::SetTeamInfo(Info::new("Acme2"))).unwrap();
        server.tamper_block(1, |payload| payload.replace("Acme2", "Evil"));

        let (identity, _) = admin.into_parts().unwrap();
        let reader = service_for(
            TeamIdentity::new("v@acme.co", identity.initial_team_public_key, identity.checkpoint)
                .unwrap(),
            &server,
        );
        assert!(matches!(
            reader.get_verified_team_updates(),
            Err(ServiceError::Chain(ChainError::BadSignature))
        ));
        // Genesis arrived in the same page, so nothing was committed.
        assert!(reader.team().unwrap().is_none());
    }

    #[test]
    fn test_add_member_directly() {
        let server = MockTeamServer::new(10);
        let service = created(&server);
        let bob = TeamIdentity::new(
            "bob@acme.co",
            PublicKey::from_bytes([0; 32]),
            BlockHash::from_bytes([0; 32]),
        )
        .unwrap();
        service.add_member(bob.member_identity(vec![], vec![])).unwrap();
        assert_eq!(service.members().unwrap().len(), 2);
        assert_eq!(service.admins().unwrap().len(), 1);
    }

    #[test]
    fn test_log_blocks_are_sent_once() {
        let server = MockTeamServer::new(10);
        let service = created(&server);
        service
            .response_for(Operation::AddLoggingEndpoint(LoggingEndpoint::CommandEncrypted {}))
            .unwrap();
        service.write_log(b"ssh git@acme.co").unwrap();
        service.write_log(b"ssh build@acme.co").unwrap();

        assert_eq!(service.send_unsent_log_blocks().unwrap(), 3);
        assert_eq!(service.send_unsent_log_blocks().unwrap(), 0);

        let posted = server.log_blocks();
        assert_eq!(posted.len(), 3);
        assert!(matches!(
            posted[0].decode_payload().unwrap(),
            Payload::CreateLogChain(_)
        ));
        assert!(matches!(
            posted[2].decode_payload().unwrap(),
            Payload::AppendLogBlock(ref a) if matches!(a.operation, LogOperation::EncryptLog(_))
        ));
    }

    #[test]
    fn test_rejected_log_block_stays_unsent() {
        let server = MockTeamServer::new(10);
        let service = created(&server);
        service
            .response_for(Operation::AddLoggingEndpoint(LoggingEndpoint::CommandEncrypted {}))
            .unwrap();
        server.set_reject_log_blocks(true);
        assert!(matches!(
            service.send_unsent_log_blocks(),
            Err(ServiceError::BlockDidNotPost(_))
        ));
        server.set_reject_log_blocks(false);
        assert_eq!(service.send_unsent_log_blocks().unwrap(), 1);
    }

    #[test]
    fn test_config_defaults_and_partial_json() {
        let config: TeamServiceConfig =
            serde_json::from_str(r#"{"endpoint":"http://localhost:8080"}"#).unwrap();
        assert_eq!(config.endpoint, "http://localhost:8080");
        assert_eq!(config.max_read_pages, DEFAULT_MAX_READ_PAGES);
        assert_eq!(config.main_chain_retries, DEFAULT_MAIN_CHAIN_RETRIES);
        assert_eq!(config.request_timeout_secs, 30);
    }
}
