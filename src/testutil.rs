//! Shared test fixtures: deterministic keys, a signing repository builder,
//! and tar/gzip helpers. Everything here is test-only.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use url::Url;

use crate::canonical::to_canonical_json;
use crate::crypto::{KeyId, PublicKey, METHOD_ED25519};
use crate::engine::{Client, ClientConfig};
use crate::layout::{CacheLayout, PackageId, RepoLayout};
use crate::metadata::{
    FileInfo, Mirror as MirrorEntry, Mirrors, RoleKeys, RoleName, Root, Snapshot, Targets,
    Timestamp,
};
use crate::transport::InMemoryTransport;

/// An Ed25519 keypair derived from a fixed seed, so tests need no RNG.
pub(crate) struct TestKey {
    pub signing: SigningKey,
    pub public: PublicKey,
    pub id: KeyId,
}

impl TestKey {
    pub fn from_seed(seed: u8) -> TestKey {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let public = PublicKey::ed25519(signing.verifying_key().as_bytes());
        let id = public.key_id();
        TestKey {
            signing,
            public,
            id,
        }
    }
}

/// Signs a payload and assembles the canonical envelope bytes, exactly as a
/// repository authoring tool would put them on the wire.
pub(crate) fn sign_envelope(payload: Value, keys: &[&TestKey]) -> Vec<u8> {
    let signed_bytes = to_canonical_json(&payload).unwrap();
    let signatures: Vec<Value> = keys
        .iter()
        .map(|k| {
            let sig = k.signing.sign(&signed_bytes);
            json!({
                "keyid": k.id.as_str(),
                "method": METHOD_ED25519,
                "sig": BASE64.encode(sig.to_bytes()),
            })
        })
        .collect();
    let envelope = json!({ "signed": payload, "signatures": signatures });
    to_canonical_json(&envelope).unwrap()
}

/// Builds a ustar archive (with the standard two-block zero trailer) from
/// path/content pairs. Deterministic: all metadata is fixed.
pub(crate) fn build_tar(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, data.as_slice())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

pub(crate) fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn info_of(bytes: &[u8]) -> FileInfo {
    FileInfo::sha256(bytes.len() as u64, hex::encode(Sha256::digest(bytes)))
}

/// Everything the repository currently serves, byte for byte.
#[derive(Default, Clone)]
pub(crate) struct Published {
    pub root: Vec<u8>,
    pub timestamp: Vec<u8>,
    pub snapshot: Vec<u8>,
    pub mirrors: Vec<u8>,
    pub index_tar: Vec<u8>,
    pub index_tar_gz: Vec<u8>,
}

/// A complete signed repository served over the in-memory transport.
///
/// Mutate the fields (keys, versions, expiries, packages) and call
/// [`TestRepo::publish`] to re-sign and re-upload.
pub(crate) struct TestRepo {
    pub transport: Arc<InMemoryTransport>,
    pub layout: RepoLayout,
    pub root_key: TestKey,
    pub timestamp_key: TestKey,
    pub snapshot_key: TestKey,
    pub mirrors_key: TestKey,
    pub targets_key: TestKey,
    /// Expiry of the long-lived files (root, mirrors, package targets).
    pub expires: DateTime<Utc>,
    /// Expiry of the frequently re-signed files (timestamp, snapshot).
    pub fresh_expires: DateTime<Utc>,
    pub root_version: u64,
    pub ts_version: u64,
    pub ss_version: u64,
    pub mirrors_version: u64,
    pub mirror_entries: Vec<MirrorEntry>,
    pub index_entries: BTreeMap<String, Vec<u8>>,
    pub published: Published,
    prev_root: Option<Root>,
}

impl TestRepo {
    pub fn new() -> TestRepo {
        let far_future = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let mut repo = TestRepo {
            transport: Arc::new(InMemoryTransport::new()),
            layout: RepoLayout::default(),
            root_key: TestKey::from_seed(1),
            timestamp_key: TestKey::from_seed(2),
            snapshot_key: TestKey::from_seed(3),
            mirrors_key: TestKey::from_seed(4),
            targets_key: TestKey::from_seed(5),
            expires: far_future,
            fresh_expires: far_future,
            root_version: 1,
            ts_version: 1,
            ss_version: 1,
            mirrors_version: 1,
            mirror_entries: Vec::new(),
            index_entries: BTreeMap::new(),
            published: Published::default(),
            prev_root: None,
        };
        repo.publish();
        repo
    }

    pub fn root_payload(&self) -> Root {
        let mut keys = BTreeMap::new();
        for key in [
            &self.root_key,
            &self.timestamp_key,
            &self.snapshot_key,
            &self.mirrors_key,
            &self.targets_key,
        ] {
            keys.insert(key.id.clone(), key.public.clone());
        }
        let mut roles = BTreeMap::new();
        for (role, key) in [
            (RoleName::Root, &self.root_key),
            (RoleName::Timestamp, &self.timestamp_key),
            (RoleName::Snapshot, &self.snapshot_key),
            (RoleName::Mirrors, &self.mirrors_key),
            (RoleName::Targets, &self.targets_key),
        ] {
            roles.insert(
                role,
                RoleKeys {
                    keyids: vec![key.id.clone()],
                    threshold: 1,
                },
            );
        }
        Root {
            version: self.root_version,
            expires: self.expires,
            keys,
            roles,
        }
    }

    pub fn previous_root_payload(&self) -> Root {
        self.prev_root.clone().expect("no rotation has happened")
    }

    pub fn root_key_id(&self) -> KeyId {
        self.root_key.id.clone()
    }

    pub fn timestamp_version(&self) -> u64 {
        self.ts_version
    }

    pub fn signed_root(&self) -> Vec<u8> {
        self.published.root.clone()
    }

    pub fn signed_timestamp(&self) -> Vec<u8> {
        self.published.timestamp.clone()
    }

    /// Adds a package: uploads its tarball and registers its target
    /// metadata in the index. Call `publish` afterwards.
    pub fn add_package(&mut self, name: &str, version: &str, content: Vec<u8>) -> PackageId {
        let pkg = PackageId::new(name, version);
        let tarball_path = self.layout.package_tarball_path(&pkg);
        let mut targets = BTreeMap::new();
        targets.insert(tarball_path.clone(), info_of(&content));
        let payload = Targets {
            version: 1,
            expires: self.expires,
            targets,
        };
        let bytes = sign_envelope(
            serde_json::to_value(&payload).unwrap(),
            &[&self.targets_key],
        );
        self.index_entries
            .insert(self.layout.package_targets_path(&pkg), bytes);
        self.transport.put(&tarball_path, content);
        pkg
    }

    /// Replaces the timestamp signing key and stages a new root.
    pub fn rotate_timestamp_key(&mut self, seed: u8) {
        self.prev_root = Some(self.root_payload());
        self.timestamp_key = TestKey::from_seed(seed);
        self.root_version += 1;
        self.ts_version += 1;
    }

    /// Re-signs everything and uploads it to the transport.
    pub fn publish(&mut self) {
        let root = sign_envelope(
            serde_json::to_value(self.root_payload()).unwrap(),
            &[&self.root_key],
        );

        let mirrors_payload = Mirrors {
            version: self.mirrors_version,
            expires: self.expires,
            mirrors: self.mirror_entries.clone(),
        };
        let mirrors = sign_envelope(
            serde_json::to_value(&mirrors_payload).unwrap(),
            &[&self.mirrors_key],
        );

        let pairs: Vec<(&str, Vec<u8>)> = self
            .index_entries
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.clone()))
            .collect();
        let index_tar = build_tar(&pairs);
        let index_tar_gz = gzip(&index_tar);

        let mut ss_meta = BTreeMap::new();
        ss_meta.insert(self.layout.root.clone(), info_of(&root));
        ss_meta.insert(self.layout.mirrors.clone(), info_of(&mirrors));
        ss_meta.insert(self.layout.index_tar_gz.clone(), info_of(&index_tar_gz));
        ss_meta.insert(self.layout.index_tar.clone(), info_of(&index_tar));
        let ss_payload = Snapshot {
            version: self.ss_version,
            expires: self.fresh_expires,
            meta: ss_meta,
        };
        let snapshot = sign_envelope(
            serde_json::to_value(&ss_payload).unwrap(),
            &[&self.snapshot_key],
        );

        let mut ts_meta = BTreeMap::new();
        ts_meta.insert(self.layout.snapshot.clone(), info_of(&snapshot));
        let ts_payload = Timestamp {
            version: self.ts_version,
            expires: self.fresh_expires,
            meta: ts_meta,
        };
        let timestamp = sign_envelope(
            serde_json::to_value(&ts_payload).unwrap(),
            &[&self.timestamp_key],
        );

        self.transport.put(&self.layout.root, root.clone());
        self.transport.put(&self.layout.mirrors, mirrors.clone());
        self.transport
            .put(&self.layout.index_tar, index_tar.clone());
        self.transport
            .put(&self.layout.index_tar_gz, index_tar_gz.clone());
        self.transport.put(&self.layout.snapshot, snapshot.clone());
        self.transport
            .put(&self.layout.timestamp, timestamp.clone());

        self.published = Published {
            root,
            timestamp,
            snapshot,
            mirrors,
            index_tar,
            index_tar_gz,
        };
    }

    /// A client wired to this repository through one out-of-band mirror.
    pub fn client(&self, cache_dir: &Path) -> Client<Arc<InMemoryTransport>> {
        self.client_with_mirrors(cache_dir, &["https://mirror-a.example/"])
    }

    pub fn client_with_mirrors(
        &self,
        cache_dir: &Path,
        mirrors: &[&str],
    ) -> Client<Arc<InMemoryTransport>> {
        let config = ClientConfig {
            repo: self.layout.clone(),
            cache: CacheLayout::default(),
            mirrors: mirrors.iter().map(|m| Url::parse(m).unwrap()).collect(),
            force_compressed_index: false,
        };
        Client::new(self.transport.clone(), cache_dir, config).unwrap()
    }
}
