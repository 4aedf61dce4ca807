//! In-memory team server for tests.
//!
//! Behaves like the real server for the flows the services drive: appends are
//! checked against the current tip, reads page through the chain from a
//! pointer, and failures come back as `{"error": ..}` envelopes. Fault toggles
//! let tests simulate a rejecting, stalling or truncating server.

use std::sync::Mutex;

use serde_json::json;

use crate::chain::block::{Block, ReadResponse, ServerResponse};
use crate::chain::payload::{Payload, TeamPointer};

use super::{TeamServer, TransportError};

#[derive(Default)]
struct MockState {
    blocks: Vec<Block>,
    log_blocks: Vec<Block>,
    reads: usize,
    reject_appends: bool,
    reject_log_blocks: bool,
    stall_reads: bool,
    withhold_tail: usize,
}

pub struct MockTeamServer {
    page_size: usize,
    state: Mutex<MockState>,
}

fn success<T: serde::Serialize>(value: T) -> String {
    serde_json::to_string(&ServerResponse::Success(value)).unwrap()
}

fn error(message: &str) -> String {
    serde_json::to_string(&ServerResponse::<()>::Error(message.to_string())).unwrap()
}

impl MockTeamServer {
    pub fn new(page_size: usize) -> Self {
        MockTeamServer {
            page_size,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn block_count(&self) -> usize {
        self.state.lock().unwrap().blocks.len()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn log_blocks(&self) -> Vec<Block> {
        self.state.lock().unwrap().log_blocks.clone()
    }

    pub fn set_reject_appends(&self, reject: bool) {
        self.state.lock().unwrap().reject_appends = reject;
    }

    pub fn set_reject_log_blocks(&self, reject: bool) {
        self.state.lock().unwrap().reject_log_blocks = reject;
    }

    /// Answer every read with an empty final page.
    pub fn set_stall_reads(&self, stall: bool) {
        self.state.lock().unwrap().stall_reads = stall;
    }

    /// Hide the newest `n` blocks from reads.
    pub fn set_withhold_tail(&self, n: usize) {
        self.state.lock().unwrap().withhold_tail = n;
    }

    /// Rewrite the stored payload of block `index` without re-signing it.
    pub fn tamper_block(&self, index: usize, f: impl FnOnce(&str) -> String) {
        let mut state = self.state.lock().unwrap();
        let block = &mut state.blocks[index];
        block.payload = f(&block.payload);
    }

    fn handle(&self, request: Block) -> String {
        let mut state = self.state.lock().unwrap();

        if !request.verify() {
            return error("bad request signature");
        }
        let payload = match request.decode_payload() {
            Ok(payload) => payload,
            Err(e) => return error(&e.to_string()),
        };

        match payload {
            Payload::CreateChain(_) => {
                if !state.blocks.is_empty() {
                    return error("team already exists");
                }
                state.blocks.push(request);
                success(json!({}))
            }
            Payload::AppendBlock(append) => {
                if state.reject_appends {
                    return error("append rejected");
                }
                match state.blocks.last() {
                    Some(tip) if tip.hash() == append.last_block_hash => {}
                    _ => return error("last block hash is not the chain tip"),
                }
                state.blocks.push(request);
                success(json!({}))
            }
            Payload::ReadBlocks(read) => {
                state.reads += 1;
                if state.stall_reads {
                    return success(ReadResponse::default());
                }
                let visible = state.blocks.len().saturating_sub(state.withhold_tail);
                let start = match read.team_pointer {
                    TeamPointer::PublicKey(public_key) => match state.blocks.first() {
                        Some(genesis) if genesis.public_key == public_key => 0,
                        _ => return error("team not found"),
                    },
                    TeamPointer::LastBlockHash(hash) => {
                        match state.blocks.iter().position(|b| b.hash() == hash) {
                            Some(i) => i + 1,
                            None => return error("block not found"),
                        }
                    }
                };
                let start = start.min(visible);
                let end = (start + self.page_size).min(visible);
                success(ReadResponse {
                    blocks: state.blocks[start..end].to_vec(),
                    more: end < visible,
                })
            }
            Payload::CreateLogChain(_) | Payload::AppendLogBlock(_) => {
                if state.reject_log_blocks {
                    return error("log block rejected");
                }
                state.log_blocks.push(request);
                success(json!({}))
            }
            Payload::ReadLogBlocks(_) => success(ReadResponse {
                blocks: state.log_blocks.clone(),
                more: false,
            }),
        }
    }
}

impl TeamServer for MockTeamServer {
    fn send(&self, body: &str) -> Result<String, TransportError> {
        let request: Block =
            serde_json::from_str(body).map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(self.handle(request))
    }
}

#[cfg(feature = "native")]
#[async_trait::async_trait]
impl super::AsyncTeamServer for MockTeamServer {
    async fn send(&self, body: String) -> Result<String, TransportError> {
        TeamServer::send(self, &body)
    }
}
