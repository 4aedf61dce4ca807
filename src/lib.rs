//! # Team SigChain
//!
//! **A signed, hash-linked ledger of team membership and policy, shared by
//! devices that hold SSH/PGP identities.**
//!
//! Every change to a team (members, admins, invitations, policy, pinned SSH
//! host keys, logging endpoints) is an Ed25519-signed block whose payload
//! names the SHA-256 hash of the block before it. A device trusts nothing the
//! server says: it replays the chain from a known anchor, checks each
//! signature and link, and only then commits the folded team state to its
//! local store. Admins who enable command logging also keep a per-member
//! encrypted audit log chain, with the log key wrapped to every admin.
//!
//! ## Quick Start
//!
//! ```rust
//! use team_sigchain::{verify_and_commit, Info, MemoryTeamStore, Operation, TeamIdentity};
//!
//! let (mut admin, genesis) =
//!     TeamIdentity::new_admin("root@acme.co", "Acme", vec![], vec![]).unwrap();
//! let mut store = MemoryTeamStore::new(admin.team_id.clone());
//! verify_and_commit(&mut admin, &mut store, &[genesis]).unwrap();
//!
//! let rename = admin
//!     .signed_append_block(&store, Operation::SetTeamInfo(Info::new("Acme Inc")))
//!     .unwrap();
//! let team = verify_and_commit(&mut admin, &mut store, &[rename]).unwrap();
//! assert_eq!(team.name(), "Acme Inc");
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`chain`] | Blocks, payloads, keys, team state, limits, errors |
//! | [`crypto`] | Ed25519 signing, sealed-box key wrapping, log encryption |
//! | [`identity`] | Local device identity and invite links |
//! | [`construct`] | Signed block builders |
//! | [`verify`] | Chain verification and folding |
//! | [`store`] | Team data store contract and an in-memory store |
//! | [`service`] | Server round trips under a single service lock |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `std` | Yes | Standard library support |
//! | `native` | Yes | Async service over tokio |
//! | `network` | No | reqwest HTTP transports |

// Crate-level lint configuration: stylistic lints only.
#![allow(
    clippy::empty_line_after_doc_comments,
    clippy::doc_lazy_continuation,
    clippy::too_many_arguments,
    clippy::type_complexity,
    clippy::large_enum_variant
)]

// ── Public modules ──────────────────────────────────────────────────────────

/// Wire types: blocks, payloads, keys, team state.
pub mod chain;

/// Signing, key wrapping and symmetric encryption.
pub mod crypto;

pub mod identity;

/// Builders for every signed block a device can produce.
pub mod construct;

pub mod verify;

pub mod store;

/// Orchestration against the team server.
pub mod service;

// ── Re-exports for convenience ──────────────────────────────────────────────

pub use chain::{
    Block, BlockHash, ChainError, Info, LoggingEndpoint, MemberIdentity, Operation, Payload,
    PolicySettings, PublicKey, SshHostKey, Team,
};

pub use identity::{TeamIdentity, TeamInvite};

pub use service::{ServiceError, TeamServer, TeamService, TeamServiceConfig, TransportError};

#[cfg(feature = "native")]
pub use service::{AsyncTeamServer, AsyncTeamService};

pub use store::{MemoryTeamStore, StoreError, StoreMutation, TeamDataStore};

pub use verify::{verify_and_commit, verify_and_fold, FoldOutcome};

// ── Library metadata ────────────────────────────────────────────────────────

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
