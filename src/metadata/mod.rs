//! Typed representations of the five signed role files.
//!
//! Each role file is an envelope `{ "signed": ..., "signatures": [...] }` in
//! canonical JSON. The envelope is parsed leniently (so new signature methods
//! can appear on the wire), the payload strictly: unknown payload fields are
//! a schema violation.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::to_canonical_json;
use crate::crypto::{self, KeyId, PublicKey};
use crate::error::VerificationError;

pub mod mirrors;
pub mod root;
pub mod snapshot;
pub mod targets;
pub mod timestamp;

pub use mirrors::{Mirror, MirrorContent, Mirrors};
pub use root::{Root, RoleKeys};
pub use snapshot::Snapshot;
pub use targets::Targets;
pub use timestamp::Timestamp;

/// The five well-known role files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RoleName {
    Root,
    Timestamp,
    Snapshot,
    Mirrors,
    Targets,
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleName::Root => "root",
            RoleName::Timestamp => "timestamp",
            RoleName::Snapshot => "snapshot",
            RoleName::Mirrors => "mirrors",
            RoleName::Targets => "targets",
        };
        f.write_str(name)
    }
}

/// Expected length and hash set of a repository file.
///
/// The length is authoritative: downloads are refused beyond it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileInfo {
    pub length: u64,
    /// Algorithm name to lowercase hex digest.
    pub hashes: BTreeMap<String, String>,
}

impl FileInfo {
    pub fn sha256(length: u64, hex_digest: impl Into<String>) -> FileInfo {
        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_owned(), hex_digest.into());
        FileInfo { length, hashes }
    }

    /// Computes the info of a local file.
    pub fn of_file(path: &Path) -> io::Result<FileInfo> {
        let (sha256, length) = crypto::hash_and_len(path)?;
        Ok(FileInfo::sha256(length, sha256))
    }
}

/// A signature inside the envelope, still in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Signature {
    pub keyid: KeyId,
    /// Signature method tag, normally `ed25519`.
    pub method: String,
    /// Base64-encoded signature bytes.
    pub sig: String,
}

/// A parsed role file with the payload left as raw JSON.
///
/// This is the entry state of the trust pipeline: parsed from bytes, no
/// claims made. [`crate::trust`] turns it into a verified payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSigned {
    pub signed: Value,
    pub signatures: Vec<Signature>,
}

impl RawSigned {
    pub fn parse(bytes: &[u8]) -> Result<RawSigned, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Canonical bytes of the payload, the input to signature verification.
    ///
    /// Role files are canonical JSON on the wire, so this equals the
    /// on-the-wire bytes of the `signed` member.
    pub fn signed_canonical(&self, path: &str) -> Result<Vec<u8>, VerificationError> {
        to_canonical_json(&self.signed)
            .map_err(|e| VerificationError::deserialization(path, e))
    }

    /// Strictly parses the payload as role `R`.
    pub fn payload<R: Role>(&self, path: &str) -> Result<R, VerificationError> {
        let payload: R = serde_json::from_value(self.signed.clone())
            .map_err(|e| VerificationError::deserialization(path, e))?;
        payload
            .validate()
            .map_err(|detail| VerificationError::deserialization(path, detail))?;
        Ok(payload)
    }
}

/// Common surface of the five role payloads.
pub trait Role: DeserializeOwned + Serialize {
    const NAME: RoleName;

    fn version(&self) -> u64;
    fn expires(&self) -> DateTime<Utc>;

    /// Payload invariants beyond what the schema can express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Key lookup table used to resolve envelope signatures (key ID → key).
///
/// Construction checks each entry's fingerprint; an entry whose ID does not
/// match its key is dropped, so a signature referencing it later fails as an
/// unknown key rather than verifying against a mislabeled key.
#[derive(Debug, Clone, Default)]
pub struct KeyEnv(BTreeMap<KeyId, PublicKey>);

impl KeyEnv {
    pub fn from_keys(keys: &BTreeMap<KeyId, PublicKey>) -> KeyEnv {
        let mut checked = BTreeMap::new();
        for (id, key) in keys {
            if KeyId::of(key) == *id {
                checked.insert(id.clone(), key.clone());
            } else {
                log::warn!("dropping key {id}: fingerprint does not match the key");
            }
        }
        KeyEnv(checked)
    }

    pub fn lookup(&self, id: &KeyId) -> Option<&PublicKey> {
        self.0.get(id)
    }
}

/// Serde adapter for expiry timestamps: RFC 3339 with seconds precision and
/// a trailing `Z` on output, any RFC 3339 offset accepted on input.
pub(crate) mod expiry_format {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
