pub mod block;
pub mod encoding;
pub mod errors;
pub mod keys;
pub mod limits;
pub mod payload;
pub mod types;

pub use block::{Block, ReadResponse, Request, ServerResponse};
pub use errors::ChainError;
pub use keys::{BlockHash, BoxPublicKey, PublicKey, SecretBoxKey, Signature};
pub use payload::{
    AppendBlock, AppendLogBlock, CreateChain, CreateLogChain, EncryptedLog, LogOperation,
    MemberInvitation, Operation, Payload, ReadBlocks, ReadLogBlocks, TeamPointer, WrappedKey,
};
pub use types::{Info, LoggingEndpoint, MemberIdentity, PolicySettings, SshHostKey, Team};
