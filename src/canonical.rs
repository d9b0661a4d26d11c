//! Canonical JSON encoding.
//!
//! Every signature and key fingerprint in the repository format is computed
//! over this encoding: UTF-8, object members sorted byte-lexicographically,
//! no insignificant whitespace, and the minimal string escape set. Role files
//! are stored on the wire in this form, so re-encoding a parsed value yields
//! the original bytes.

use olpc_cjson::CanonicalFormatter;
use serde::Serialize;

/// Serializes `value` to canonical JSON.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut bytes, CanonicalFormatter::new());
    value.serialize(&mut ser)?;
    Ok(bytes)
}
