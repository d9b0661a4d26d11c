//! Sidecar index of the package tarball.
//!
//! Maps tar-internal paths to byte offsets so single files can be read out
//! of the index without scanning it. The sidecar is derived data: it is
//! rebuilt from the tarball whenever it is missing, unreadable, or was built
//! against a tarball of a different length. It is not security-sensitive —
//! the bytes it points at were verified when the tarball was installed.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Location of one file's data inside the tarball.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarEntry {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarIndex {
    /// Length of the tarball this index was built from; a mismatch on load
    /// means the index is stale and must be rebuilt.
    pub tar_len: u64,
    pub entries: BTreeMap<String, TarEntry>,
}

impl TarIndex {
    /// Scans the tarball and records the data offset of every regular file.
    ///
    /// A tarball that does not parse is fatal: the cache only ever installs
    /// verified tarballs, so this is local corruption, not remote noise.
    pub fn build(tar_path: &Path) -> Result<TarIndex, ClientError> {
        let corrupted = |e: &dyn std::fmt::Display| {
            ClientError::corrupted(&tar_path.to_string_lossy(), e)
        };

        let file = fs::File::open(tar_path).map_err(ClientError::io("opening index tarball"))?;
        let tar_len = file
            .metadata()
            .map_err(ClientError::io("reading index tarball metadata"))?
            .len();

        let mut entries = BTreeMap::new();
        let mut archive = tar::Archive::new(file);
        let iter = archive.entries().map_err(|e| corrupted(&e))?;
        for entry in iter {
            let entry = entry.map_err(|e| corrupted(&e))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().map_err(|e| corrupted(&e))?;
            let name = path.to_string_lossy().into_owned();
            let length = entry.header().size().map_err(|e| corrupted(&e))?;
            entries.insert(
                name,
                TarEntry {
                    offset: entry.raw_file_position(),
                    length,
                },
            );
        }

        log::trace!("indexed {} entries from {}", entries.len(), tar_path.display());
        Ok(TarIndex { tar_len, entries })
    }

    /// Loads a previously stored sidecar. Any failure yields `None`; callers
    /// rebuild from the tarball.
    pub fn load(sidecar_path: &Path) -> Option<TarIndex> {
        let bytes = fs::read(sidecar_path).ok()?;
        serde_bare::from_slice(&bytes).ok()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ClientError> {
        serde_bare::to_vec(self)
            .map_err(|e| ClientError::corrupted("tar index", e))
    }

    /// Reads one file's bytes out of the tarball.
    pub fn read_entry(&self, tar_path: &Path, name: &str) -> Result<Option<Vec<u8>>, ClientError> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        let mut file =
            fs::File::open(tar_path).map_err(ClientError::io("opening index tarball"))?;
        file.seek(SeekFrom::Start(entry.offset))
            .map_err(ClientError::io("seeking in index tarball"))?;
        let mut buf = vec![0u8; entry.length as usize];
        file.read_exact(&mut buf)
            .map_err(ClientError::io("reading from index tarball"))?;
        Ok(Some(buf))
    }
}
