//! Async team service over a tokio runtime.
//!
//! Same flows as [`TeamService`](super::TeamService), with the service lock
//! held across each await so reads and posts from one device stay ordered.
//! Rejected appends are retried after a refresh, as in the sync service.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::chain::block::{Block, Request};
use crate::chain::payload::Operation;
use crate::chain::types::{MemberIdentity, SshHostKey, Team};
use crate::construct::read_blocks_request;
use crate::identity::{TeamIdentity, TeamInvite};
use crate::store::TeamDataStore;

use super::{
    check_invite_reached, decode_post, decode_read, encode_request, fold_page, fold_posted,
    mark_posted, read_pointer, require_team, require_tip, should_retry, ReadStep, Refresh,
    Result, ServiceError, ServiceState, TeamServiceConfig, TransportError,
};

#[async_trait]
pub trait AsyncTeamServer: Send + Sync {
    async fn send(&self, body: String) -> std::result::Result<String, TransportError>;
}

#[async_trait]
impl<T: AsyncTeamServer + ?Sized> AsyncTeamServer for Arc<T> {
    async fn send(&self, body: String) -> std::result::Result<String, TransportError> {
        (**self).send(body).await
    }
}

pub struct AsyncTeamService<S: TeamDataStore, T: AsyncTeamServer> {
    state: Mutex<ServiceState<S>>,
    server: T,
    config: TeamServiceConfig,
}

impl<S: TeamDataStore, T: AsyncTeamServer> AsyncTeamService<S, T> {
    pub fn new(identity: TeamIdentity, store: S, server: T, config: TeamServiceConfig) -> Self {
        AsyncTeamService {
            state: Mutex::new(ServiceState { identity, store }),
            server,
            config,
        }
    }

    pub fn config(&self) -> &TeamServiceConfig {
        &self.config
    }

    async fn post(&self, request: &Request) -> Result<()> {
        let body = self.server.send(encode_request(request)?).await?;
        decode_post(&body)
    }

    async fn read_loop<F>(&self, state: &mut ServiceState<S>, make_request: F) -> Result<Team>
    where
        F: Fn(&ServiceState<S>) -> Result<Request>,
    {
        for _ in 0..self.config.max_read_pages {
            let request = make_request(&*state)?;
            let body = self.server.send(encode_request(&request)?).await?;
            let page = decode_read(&body)?;
            if fold_page(state, page)? == ReadStep::Done {
                return require_team(state);
            }
        }
        Err(ServiceError::TooManyPages(self.config.max_read_pages))
    }

    async fn post_and_fold(&self, state: &mut ServiceState<S>, request: Request) -> Result<Team> {
        self.post(&request).await?;
        fold_posted(state, &request)
    }

    async fn append_with_retry<X, F>(
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
            match self.post(&request).await {
                Ok(()) => return Ok((extra, fold_posted(state, &request)?)),
                Err(e) if should_retry(&e, attempt, self.config.main_chain_retries) => {
                    attempt += 1;
                    match refresh {
                        Refresh::Member => self.fetch_updates(state).await?,
                        Refresh::Invite(invite) => self.fetch_with_invite(state, invite).await?,
                    };
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_with_invite(
        &self,
        state: &mut ServiceState<S>,
        invite: &TeamInvite,
    ) -> Result<Team> {
        let nonce = invite.nonce_keypair()?;
        let team = self
            .read_loop(state, |state| {
                let pointer = read_pointer(state, invite.initial_team_public_key)?;
                Ok(read_blocks_request(pointer, &nonce)?)
            })
            .await?;
        check_invite_reached(state, invite)?;
        Ok(team)
    }

    async fn fetch_updates(&self, state: &mut ServiceState<S>) -> Result<Team> {
        self.read_loop(state, |state| {
            Ok(state.identity.read_blocks_request(&state.store)?)
        })
        .await
    }

    pub async fn create_team(&self, genesis: Block) -> Result<Team> {
        let mut state = self.state.lock().await;
        self.post_and_fold(&mut state, genesis).await
    }

    pub async fn get_team(&self, invite: &TeamInvite) -> Result<Team> {
        let mut state = self.state.lock().await;
        self.fetch_with_invite(&mut state, invite).await
    }

    pub async fn get_verified_team_updates(&self) -> Result<Team> {
        let mut state = self.state.lock().await;
        self.fetch_updates(&mut state).await
    }

    pub async fn invite(&self) -> Result<TeamInvite> {
        let mut state = self.state.lock().await;
        let (invite, _) = self
            .append_with_retry(&mut state, Refresh::Member, |state| {
                Ok(state.identity.invitation_block(&state.store)?)
            })
            .await?;
        Ok(invite)
    }

    pub async fn cancel_invite(&self) -> Result<Team> {
        let mut state = self.state.lock().await;
        let ((), team) = self
            .append_with_retry(&mut state, Refresh::Member, |state| {
                Ok(((), state.identity.cancel_invitation_block(&state.store)?))
            })
            .await?;
        Ok(team)
    }

    pub async fn accept_invite(
        &self,
        invite: &TeamInvite,
        ssh_public_key: Vec<u8>,
        pgp_public_key: Vec<u8>,
    ) -> Result<Team> {
        let mut state = self.state.lock().await;
        require_tip(&state)?;
        let ((), team) = self
            .append_with_retry(&mut state, Refresh::Invite(invite), |state| {
                let request = state.identity.accept_invite_block(
                    &state.store,
                    invite,
                    ssh_public_key.clone(),
                    pgp_public_key.clone(),
                )?;
                Ok(((), request))
            })
            .await?;
        Ok(team)
    }

    pub async fn add_member(&self, member: MemberIdentity) -> Result<Team> {
        let mut state = self.state.lock().await;
        require_tip(&state)?;
        let ((), team) = self
            .append_with_retry(&mut state, Refresh::Member, |state| {
                Ok(((), state.identity.add_member_block(&state.store, member.clone())?))
            })
            .await?;
        Ok(team)
    }

    pub async fn response_for(&self, operation: Operation) -> Result<Team> {
        let mut state = self.state.lock().await;
        require_tip(&state)?;
        let ((), team) = self
            .append_with_retry(&mut state, Refresh::Member, |state| {
                Ok(((), state.identity.signed_append_block(&state.store, operation.clone())?))
            })
            .await?;
        Ok(team)
    }

    pub async fn write_log(&self, data: &[u8]) -> Result<Block> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        Ok(state.identity.write_log_block(&mut state.store, data)?)
    }

    pub async fn send_unsent_log_blocks(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let unsent = state.store.unposted_log_blocks()?;
        for block in &unsent {
            self.post(block).await?;
            mark_posted(&mut state, block)?;
        }
        if !unsent.is_empty() {
            log::info!("sent {} log block(s)", unsent.len());
        }
        Ok(unsent.len())
    }

    pub async fn team(&self) -> Result<Option<Team>> {
        Ok(self.state.lock().await.store.fetch_team()?)
    }

    pub async fn identity(&self) -> TeamIdentity {
        self.state.lock().await.identity.clone()
    }

    pub async fn members(&self) -> Result<Vec<MemberIdentity>> {
        Ok(self.state.lock().await.store.fetch_members()?)
    }

    pub async fn admins(&self) -> Result<Vec<MemberIdentity>> {
        Ok(self.state.lock().await.store.fetch_admins()?)
    }

    pub async fn is_admin(&self) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.store.is_admin(&state.identity.public_key())?)
    }

    pub async fn pinned_hosts(&self) -> Result<Vec<SshHostKey>> {
        Ok(self.state.lock().await.store.fetch_pinned_hosts()?)
    }

    pub fn into_parts(self) -> (TeamIdentity, S) {
        let state = self.state.into_inner();
        (state.identity, state.store)
    }
}
