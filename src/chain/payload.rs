//! Signed payload types.
//!
//! Every block and request carries a JSON payload whose single top-level key
//! selects the variant (`{"append_block": {...}}`). The enums here are closed:
//! decoding fails on an unknown key, on an empty object, and on an object with
//! more than one key.
//!
//! Only `CreateChain`/`AppendBlock` (main chain) and
//! `CreateLogChain`/`AppendLogBlock` (log chain) are ever stored as blocks.
//! `ReadBlocks`/`ReadLogBlocks` are request-only.

use serde::{Deserialize, Serialize};

use crate::chain::encoding::base64_bytes;
use crate::chain::errors::ChainError;
use crate::chain::keys::{BlockHash, BoxPublicKey, PublicKey};
use crate::chain::types::{Info, LoggingEndpoint, MemberIdentity, PolicySettings, SshHostKey};

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    CreateChain(CreateChain),
    ReadBlocks(ReadBlocks),
    AppendBlock(AppendBlock),

    CreateLogChain(CreateLogChain),
    ReadLogBlocks(ReadLogBlocks),
    AppendLogBlock(AppendLogBlock),
}

impl Payload {
    /// Canonical JSON encoding. Field order is fixed by struct definition, so
    /// the same payload always yields the same bytes (and the same hash).
    pub fn to_json(&self) -> Result<String, ChainError> {
        serde_json::to_string(self).map_err(|e| ChainError::BadPayload(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ChainError> {
        serde_json::from_str(json).map_err(|e| ChainError::BadPayload(e.to_string()))
    }

    /// Wire name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::CreateChain(_) => "create_chain",
            Payload::ReadBlocks(_) => "read_blocks",
            Payload::AppendBlock(_) => "append_block",
            Payload::CreateLogChain(_) => "create_log_chain",
            Payload::ReadLogBlocks(_) => "read_log_blocks",
            Payload::AppendLogBlock(_) => "append_log_block",
        }
    }
}

// ---------------------------------------------------------------------------
// Main chain
// ---------------------------------------------------------------------------

/// Genesis payload. Signed by the team's initial public key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CreateChain {
    #[serde(rename = "creator_identity")]
    pub creator: MemberIdentity,
    pub team_info: Info,
}

/// Points the server at a team: by genesis key, or by the last block the
/// reader already has.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamPointer {
    PublicKey(PublicKey),
    LastBlockHash(BlockHash),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReadBlocks {
    pub team_pointer: TeamPointer,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    pub unix_seconds: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AppendBlock {
    pub last_block_hash: BlockHash,
    pub operation: Operation,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MemberInvitation {
    pub nonce_public_key: PublicKey,
}

/// Operations applied by `AppendBlock`.
///
/// All are signed by a current admin except `AcceptInvite`, which is signed by
/// the one-time invitation nonce keypair.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    InviteMember(MemberInvitation),
    CancelInvite(MemberInvitation),
    AcceptInvite(MemberIdentity),

    AddMember(MemberIdentity),
    RemoveMember(PublicKey),

    SetPolicy(PolicySettings),
    SetTeamInfo(Info),

    PinHostKey(SshHostKey),
    UnpinHostKey(SshHostKey),

    AddLoggingEndpoint(LoggingEndpoint),
    RemoveLoggingEndpoint(LoggingEndpoint),

    AddAdmin(PublicKey),
    RemoveAdmin(PublicKey),
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::InviteMember(_) => "invite_member",
            Operation::CancelInvite(_) => "cancel_invite",
            Operation::AcceptInvite(_) => "accept_invite",
            Operation::AddMember(_) => "add_member",
            Operation::RemoveMember(_) => "remove_member",
            Operation::SetPolicy(_) => "set_policy",
            Operation::SetTeamInfo(_) => "set_team_info",
            Operation::PinHostKey(_) => "pin_host_key",
            Operation::UnpinHostKey(_) => "unpin_host_key",
            Operation::AddLoggingEndpoint(_) => "add_logging_endpoint",
            Operation::RemoveLoggingEndpoint(_) => "remove_logging_endpoint",
            Operation::AddAdmin(_) => "add_admin",
            Operation::RemoveAdmin(_) => "remove_admin",
        }
    }
}

// ---------------------------------------------------------------------------
// Log chain
// ---------------------------------------------------------------------------

/// The log encryption key sealed to one recipient's encryption key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WrappedKey {
    pub public_key: BoxPublicKey,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CreateLogChain {
    pub team_pointer: TeamPointer,
    pub wrapped_keys: Vec<WrappedKey>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EncryptedLog {
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogOperation {
    AddWrappedKeys(Vec<WrappedKey>),
    RotateKey(Vec<WrappedKey>),
    EncryptLog(EncryptedLog),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AppendLogBlock {
    pub last_block_hash: BlockHash,
    pub operation: LogOperation,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReadLogBlocks {
    pub team_pointer: TeamPointer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_public_key: Option<PublicKey>,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    pub unix_seconds: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(b: u8) -> BlockHash {
        BlockHash::from_bytes([b; 32])
    }

    #[test]
    fn test_append_block_wire_shape() {
        let payload = Payload::AppendBlock(AppendBlock {
            last_block_hash: hash(1),
            operation: Operation::SetTeamInfo(Info::new("Acme2")),
        });
        let json = payload.to_json().unwrap();
        assert_eq!(
            json,
            format!(
                r#"{{"append_block":{{"last_block_hash":"{}","operation":{{"set_team_info":{{"name":"Acme2"}}}}}}}}"#,
                hash(1).to_base64()
            )
        );
        assert_eq!(Payload::from_json(&json).unwrap(), payload);
    }

    #[test]
    fn test_key_operations_are_bare_strings() {
        let pk = PublicKey::from_bytes([4; 32]);
        let value = serde_json::to_value(Operation::RemoveMember(pk)).unwrap();
        assert_eq!(value["remove_member"], pk.to_base64());

        let value = serde_json::to_value(Operation::AddAdmin(pk)).unwrap();
        assert_eq!(value["add_admin"], pk.to_base64());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let make = || {
            Payload::AppendBlock(AppendBlock {
                last_block_hash: hash(9),
                operation: Operation::SetPolicy(PolicySettings {
                    temporary_approval_seconds: Some(10800),
                }),
            })
        };
        assert_eq!(make().to_json().unwrap(), make().to_json().unwrap());
    }

    #[test]
    fn test_rejects_zero_variants() {
        assert!(matches!(
            Payload::from_json("{}"),
            Err(ChainError::BadPayload(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_variant() {
        assert!(Payload::from_json(r#"{"delete_chain":{}}"#).is_err());
    }

    #[test]
    fn test_rejects_multiple_variants() {
        let single = Payload::AppendBlock(AppendBlock {
            last_block_hash: hash(2),
            operation: Operation::SetTeamInfo(Info::new("x")),
        })
        .to_json()
        .unwrap();
        // Splice a second top-level key onto a valid payload.
        let doubled = format!(r#"{},"read_blocks":{{}}}}"#, &single[..single.len() - 1]);
        assert!(Payload::from_json(&doubled).is_err());
    }

    #[test]
    fn test_operation_rejects_multiple_keys() {
        let pk = PublicKey::from_bytes([4; 32]).to_base64();
        let json = format!(r#"{{"add_admin":"{pk}","remove_admin":"{pk}"}}"#);
        assert!(serde_json::from_str::<Operation>(&json).is_err());
    }

    #[test]
    fn test_team_pointer_variants() {
        let json = serde_json::to_string(&TeamPointer::LastBlockHash(hash(3))).unwrap();
        assert!(json.starts_with(r#"{"last_block_hash":"#));

        let json = serde_json::to_string(&TeamPointer::PublicKey(PublicKey::from_bytes([3; 32])))
            .unwrap();
        assert!(json.starts_with(r#"{"public_key":"#));
    }

    #[test]
    fn test_log_operation_shapes() {
        let rotate = LogOperation::RotateKey(vec![WrappedKey {
            public_key: BoxPublicKey::from_bytes([7; 32]),
            ciphertext: vec![1, 2, 3],
        }]);
        let value = serde_json::to_value(&rotate).unwrap();
        assert!(value["rotate_key"].is_array());
        assert_eq!(value["rotate_key"][0]["ciphertext"], "AQID");
    }

    #[test]
    fn test_creator_identity_field_name() {
        let create = CreateChain {
            creator: MemberIdentity {
                public_key: PublicKey::from_bytes([1; 32]),
                encryption_public_key: BoxPublicKey::from_bytes([2; 32]),
                email: "root@acme.co".into(),
                ssh_public_key: vec![],
                pgp_public_key: vec![],
            },
            team_info: Info::new("Acme"),
        };
        let value = serde_json::to_value(Payload::CreateChain(create)).unwrap();
        assert!(value["create_chain"]["creator_identity"].is_object());
        assert_eq!(value["create_chain"]["team_info"]["name"], "Acme");
    }
}
