use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{KeyId, PublicKey};
use crate::metadata::{expiry_format, KeyEnv, Role, RoleName};

/// The trust anchor: key material and signing policy for every role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Root {
    pub version: u64,
    #[serde(with = "expiry_format")]
    pub expires: DateTime<Utc>,
    /// Key ID → public key, for every key any role may use.
    pub keys: BTreeMap<KeyId, PublicKey>,
    /// Role name → authorized key IDs and signature threshold.
    pub roles: BTreeMap<RoleName, RoleKeys>,
}

/// Signing policy for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleKeys {
    pub keyids: Vec<KeyId>,
    pub threshold: u32,
}

impl Root {
    pub fn role_keys(&self, role: RoleName) -> Option<&RoleKeys> {
        self.roles.get(&role)
    }

    /// Key environment for resolving signatures on non-root files.
    pub fn key_env(&self) -> KeyEnv {
        KeyEnv::from_keys(&self.keys)
    }
}

impl Role for Root {
    const NAME: RoleName = RoleName::Root;

    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn validate(&self) -> Result<(), String> {
        if self.version < 1 {
            return Err("root version must be at least 1".to_owned());
        }
        for role in [
            RoleName::Root,
            RoleName::Timestamp,
            RoleName::Snapshot,
            RoleName::Mirrors,
            RoleName::Targets,
        ] {
            let keys = self
                .roles
                .get(&role)
                .ok_or_else(|| format!("missing policy for role {role}"))?;
            if keys.threshold < 1 {
                return Err(format!("role {role} has a zero signature threshold"));
            }
        }
        Ok(())
    }
}
