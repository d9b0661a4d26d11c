//! Trust labels and role verification.
//!
//! Values move through three states: parsed with no claims ([`RawSigned`]),
//! signature-checked against a role's policy ([`Verified`]), and additionally
//! checked for version monotonicity and freshness ([`Trusted`]). The wrapper
//! constructors are private to this crate, so the only ways to obtain a
//! `Trusted` value are the verification functions below and the designated
//! local entry points (bootstrap and loading the client's own cache).

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::crypto::{KeyId, PublicKey};
use crate::error::VerificationError;
use crate::metadata::{KeyEnv, RawSigned, Role, RoleName, Root};

/// A payload whose signatures satisfied its role's key set and threshold.
#[derive(Debug, Clone)]
pub struct Verified<T> {
    value: T,
}

impl<T> Verified<T> {
    fn new(value: T) -> Verified<T> {
        Verified { value }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub(crate) fn into_trusted(self) -> Trusted<T> {
        Trusted { value: self.value }
    }
}

/// A payload that is verified and whose version and expiry have been
/// enforced against the caller's expectations.
#[derive(Debug, Clone)]
pub struct Trusted<T> {
    value: T,
}

impl<T> Trusted<T> {
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Applying a projection to trusted data yields trusted data.
    pub fn map<U>(&self, f: impl FnOnce(&T) -> U) -> Trusted<U> {
        Trusted {
            value: f(&self.value),
        }
    }
}

/// Designated entry point for data that is trusted by provenance rather than
/// verification: the bootstrap root and files read back from the client's
/// own cache (which only ever contains fully-verified payloads).
pub(crate) fn declare_trusted<T>(value: T) -> Trusted<T> {
    Trusted { value }
}

/// Verifies a role file against the trusted root's policy for that role.
///
/// The checks run in a fixed order: signatures first, then the version
/// floor, then expiry. The order matters — an attacker must not be able to
/// trade an expired-but-validly-signed file against an unexpired file with
/// bad signatures and have the two failures confused.
///
/// `min_version` and `now` are each optional; when absent the corresponding
/// check is skipped and the result must not be treated as fresh.
pub fn verify_role<R: Role>(
    trusted_root: &Trusted<Root>,
    path: &str,
    min_version: Option<u64>,
    now: Option<DateTime<Utc>>,
    raw: &RawSigned,
) -> Result<Verified<R>, VerificationError> {
    let root = trusted_root.get();
    let payload: R = raw.payload(path)?;
    let signed_bytes = raw.signed_canonical(path)?;

    // Root files are self-contained: their signatures resolve against their
    // own key table, which is how a rotated root can carry signatures from
    // both the outgoing and the incoming root keys. Everything else resolves
    // against the trusted root's keys.
    let env = if R::NAME == RoleName::Root {
        let keys: BTreeMap<KeyId, PublicKey> = match raw.signed.get("keys") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| VerificationError::deserialization(path, e))?,
            None => BTreeMap::new(),
        };
        KeyEnv::from_keys(&keys)
    } else {
        root.key_env()
    };

    let role_keys = root.role_keys(R::NAME).ok_or_else(|| {
        VerificationError::SignaturesMissing {
            path: path.to_owned(),
        }
    })?;

    // Resolve every signature's key ID before any cryptographic check runs.
    let mut resolved = Vec::with_capacity(raw.signatures.len());
    for sig in &raw.signatures {
        let key = env
            .lookup(&sig.keyid)
            .ok_or_else(|| VerificationError::UnknownKey {
                path: path.to_owned(),
                keyid: sig.keyid.clone(),
            })?;
        resolved.push((sig, key));
    }

    // Signatures from keys not declared for this role are dropped; the rest
    // are verified and counted as distinct signing keys.
    let mut signing_keys = BTreeSet::new();
    for (sig, key) in resolved {
        if !role_keys.keyids.contains(&sig.keyid) {
            continue;
        }
        let Ok(sig_bytes) = BASE64.decode(&sig.sig) else {
            continue;
        };
        if key.verify(&sig.method, &signed_bytes, &sig_bytes)
            && !signing_keys.insert(sig.keyid.clone())
        {
            return Err(VerificationError::SignaturesNotUnique {
                path: path.to_owned(),
                keyid: sig.keyid.clone(),
            });
        }
    }
    if (signing_keys.len() as u32) < role_keys.threshold {
        return Err(VerificationError::SignaturesMissing {
            path: path.to_owned(),
        });
    }

    if let Some(min) = min_version {
        if payload.version() < min {
            return Err(VerificationError::VersionTooLow {
                path: path.to_owned(),
                got: payload.version(),
                min,
            });
        }
    }

    if let Some(now) = now {
        if payload.expires() <= now {
            return Err(VerificationError::Expired {
                path: path.to_owned(),
                expires: payload
                    .expires()
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            });
        }
    }

    Ok(Verified::new(payload))
}

/// Bootstrap verification of a root file against out-of-band key IDs.
///
/// Signatures count only if they come from a key whose fingerprint is in the
/// trusted set; the keys themselves come from the candidate root's own key
/// table. A threshold of zero means trust-on-first-use, so resolution is
/// lenient here: signatures that cannot be resolved or checked are skipped
/// rather than rejected.
pub fn verify_fingerprints(
    trusted_key_ids: &[KeyId],
    threshold: u32,
    path: &str,
    raw: &RawSigned,
) -> Result<Verified<Root>, VerificationError> {
    let payload: Root = raw.payload(path)?;
    let signed_bytes = raw.signed_canonical(path)?;
    let env = payload.key_env();

    let mut signing_keys = BTreeSet::new();
    for sig in &raw.signatures {
        if !trusted_key_ids.contains(&sig.keyid) {
            continue;
        }
        let Some(key) = env.lookup(&sig.keyid) else {
            continue;
        };
        let Ok(sig_bytes) = BASE64.decode(&sig.sig) else {
            continue;
        };
        if key.verify(&sig.method, &signed_bytes, &sig_bytes)
            && !signing_keys.insert(sig.keyid.clone())
        {
            return Err(VerificationError::SignaturesNotUnique {
                path: path.to_owned(),
                keyid: sig.keyid.clone(),
            });
        }
    }
    if (signing_keys.len() as u32) < threshold {
        return Err(VerificationError::SignaturesMissing {
            path: path.to_owned(),
        });
    }

    Ok(Verified::new(payload))
}
