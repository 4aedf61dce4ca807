//! Team-level value types carried inside chain payloads, and the projected
//! `Team` state produced by folding the chain.

use serde::{Deserialize, Serialize};

use crate::chain::encoding::base64_bytes;
use crate::chain::keys::{BoxPublicKey, PublicKey};

/// The team's display information.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Info {
    pub name: String,
}

impl Info {
    pub fn new(name: impl Into<String>) -> Self {
        Info { name: name.into() }
    }
}

/// Team-wide approval policy.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicySettings {
    /// Seconds a temporary approval stays valid; `None` means unrestricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporary_approval_seconds: Option<u64>,
}

/// A member's public identity as recorded on the chain.
///
/// Keyed by `public_key`; immutable once added.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MemberIdentity {
    pub public_key: PublicKey,
    pub encryption_public_key: BoxPublicKey,
    pub email: String,
    #[serde(with = "base64_bytes")]
    pub ssh_public_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub pgp_public_key: Vec<u8>,
}

/// A pinned SSH host key (host name plus wire-format public key).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SshHostKey {
    pub host: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

/// Where audit logs are shipped.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoggingEndpoint {
    /// Logs sealed with the team log key and appended to the member's log chain.
    /// Serialized as `{"command_encrypted": {}}`.
    CommandEncrypted {},
}

/// Projected team state. Derived by folding blocks, never itself signed.
///
/// Members, admins, pinned hosts and the block log live in the data store,
/// not here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Team {
    pub info: Info,
    #[serde(default)]
    pub policy: PolicySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_invite_public_key: Option<PublicKey>,
    #[serde(default)]
    pub logging_endpoints: Vec<LoggingEndpoint>,
}

impl Team {
    pub fn new(info: Info) -> Self {
        Team {
            info,
            policy: PolicySettings::default(),
            last_invite_public_key: None,
            logging_endpoints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn command_encrypted_logging_enabled(&self) -> bool {
        self.logging_endpoints
            .contains(&LoggingEndpoint::CommandEncrypted {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_endpoint_wire_shape() {
        let json = serde_json::to_string(&LoggingEndpoint::CommandEncrypted {}).unwrap();
        assert_eq!(json, r#"{"command_encrypted":{}}"#);

        let back: LoggingEndpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LoggingEndpoint::CommandEncrypted {});
    }

    #[test]
    fn test_unknown_logging_endpoint_rejected() {
        assert!(serde_json::from_str::<LoggingEndpoint>(r#"{"syslog":{}}"#).is_err());
    }

    #[test]
    fn test_policy_omits_unset_seconds() {
        let json = serde_json::to_string(&PolicySettings::default()).unwrap();
        assert_eq!(json, "{}");

        let policy: PolicySettings =
            serde_json::from_str(r#"{"temporary_approval_seconds":3600}"#).unwrap();
        assert_eq!(policy.temporary_approval_seconds, Some(3600));
    }

    #[test]
    fn test_member_identity_field_names() {
        let member = MemberIdentity {
            public_key: PublicKey::from_bytes([1; 32]),
            encryption_public_key: BoxPublicKey::from_bytes([2; 32]),
            email: "alice@acme.co".into(),
            ssh_public_key: vec![3, 4],
            pgp_public_key: vec![5],
        };
        let value = serde_json::to_value(&member).unwrap();
        for key in [
            "public_key",
            "encryption_public_key",
            "email",
            "ssh_public_key",
            "pgp_public_key",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["ssh_public_key"], "AwQ=");
    }

    #[test]
    fn test_logging_enabled() {
        let mut team = Team::new(Info::new("Acme"));
        assert!(!team.command_encrypted_logging_enabled());
        team.logging_endpoints.push(LoggingEndpoint::CommandEncrypted {});
        assert!(team.command_encrypted_logging_enabled());
    }
}
