//! Public keys, key fingerprints, signature verification, and file hashing.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature as Ed25519Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::to_canonical_json;
use crate::metadata::FileInfo;

/// The one signature method every repository must support.
pub const METHOD_ED25519: &str = "ed25519";

/// Hex-encoded SHA-256 fingerprint of a public key's canonical JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Computes the fingerprint of a public key.
    pub fn of(key: &PublicKey) -> KeyId {
        let bytes =
            to_canonical_json(key).expect("public key serialization is infallible");
        KeyId(hex::encode(Sha256::digest(&bytes)))
    }

    pub fn from_hex(hex_digest: impl Into<String>) -> KeyId {
        KeyId(hex_digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A role-signing public key as it appears in `root.json`.
///
/// Unknown key types parse (so a repository can introduce new schemes without
/// breaking old clients) but never verify anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublicKey {
    pub keytype: String,
    pub keyval: KeyVal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyVal {
    /// Base64-encoded raw key material.
    pub public: String,
}

impl PublicKey {
    pub fn ed25519(raw: &[u8; 32]) -> PublicKey {
        PublicKey {
            keytype: METHOD_ED25519.to_owned(),
            keyval: KeyVal {
                public: BASE64.encode(raw),
            },
        }
    }

    pub fn key_id(&self) -> KeyId {
        KeyId::of(self)
    }

    /// Verifies `sig` over `data` for the given signature method.
    ///
    /// Returns `false` for anything that cannot be checked: an unrecognized
    /// method tag, a key type the method does not match, or malformed key or
    /// signature bytes. Callers count valid signatures against a threshold,
    /// so "cannot check" and "does not verify" are the same outcome.
    pub fn verify(&self, method: &str, data: &[u8], sig: &[u8]) -> bool {
        if method != METHOD_ED25519 || self.keytype != METHOD_ED25519 {
            log::trace!("skipping signature with unsupported method {method}");
            return false;
        }
        let Ok(raw) = BASE64.decode(&self.keyval.public) else {
            return false;
        };
        let Ok(raw) = <[u8; 32]>::try_from(raw.as_slice()) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&raw) else {
            return false;
        };
        let Ok(sig) = Ed25519Signature::from_slice(sig) else {
            return false;
        };
        key.verify_strict(data, &sig).is_ok()
    }
}

/// Streams a file once, computing its length and SHA-256 digest.
pub fn hash_and_len(path: &Path) -> io::Result<(String, u64)> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut len = 0u64;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        len += n as u64;
        hasher.update(&buf[..n]);
    }
    Ok((hex::encode(hasher.finalize()), len))
}

/// Checks a file against its expected length and hashes in one streaming
/// pass. True only if the length matches and every listed hash matches;
/// hashes with algorithms this client cannot compute fail the check.
pub fn verify_file_info(path: &Path, info: &FileInfo) -> io::Result<bool> {
    let (sha256, len) = hash_and_len(path)?;
    if len != info.length {
        return Ok(false);
    }
    for (algorithm, expected) in &info.hashes {
        let matches = match algorithm.as_str() {
            "sha256" => *expected == sha256,
            _ => false,
        };
        if !matches {
            return Ok(false);
        }
    }
    Ok(true)
}
