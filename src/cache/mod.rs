//! The local store of validated metadata and the package index.
//!
//! Every file is installed by atomic rename from a temp file in the cache
//! directory, so a reader never observes a half-written file: after any call
//! returns, each published name either holds a fully-verified payload or
//! does not exist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::ClientError;
use crate::layout::CacheLayout;
use crate::metadata::RoleName;

pub mod tar_index;

pub use tar_index::{TarEntry, TarIndex};

pub struct Cache {
    dir: PathBuf,
    layout: CacheLayout,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>, layout: CacheLayout) -> Result<Cache, ClientError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(ClientError::io("creating cache directory"))?;
        Ok(Cache { dir, layout })
    }

    /// Path of a cached role file, if it is present.
    pub fn get_cached(&self, role: RoleName) -> Option<PathBuf> {
        let path = self.role_path(role)?;
        path.exists().then_some(path)
    }

    fn role_path(&self, role: RoleName) -> Option<PathBuf> {
        self.layout.role_path(role).map(|p| self.dir.join(p))
    }

    pub fn index_tar_path(&self) -> PathBuf {
        self.dir.join(&self.layout.index_tar)
    }

    pub fn index_tar_gz_path(&self) -> PathBuf {
        self.dir.join(&self.layout.index_tar_gz)
    }

    fn tar_index_path(&self) -> PathBuf {
        self.dir.join(&self.layout.tar_index)
    }

    /// Length of the cached uncompressed index tarball, if one exists.
    pub fn cached_index_len(&self) -> Option<u64> {
        fs::metadata(self.index_tar_path()).ok().map(|m| m.len())
    }

    /// Atomically installs a verified role file.
    pub fn cache_role_file(&self, temp: &Path, role: RoleName) -> Result<(), ClientError> {
        let dest = self
            .role_path(role)
            .ok_or_else(|| ClientError::corrupted(&role.to_string(), "role has no cache path"))?;
        log::trace!("caching {role} metadata");
        self.install(temp, &dest)
    }

    /// Atomically installs a verified index tarball, rebuilding the tar
    /// index in the same critical section. When the compressed form is
    /// supplied it is installed alongside; otherwise a previously cached
    /// compressed form is stale and removed.
    pub fn cache_index(&self, tar_temp: &Path, tar_gz_temp: Option<&Path>) -> Result<(), ClientError> {
        self.install(tar_temp, &self.index_tar_path())?;
        match tar_gz_temp {
            Some(gz) => self.install(gz, &self.index_tar_gz_path())?,
            None => remove_if_present(&self.index_tar_gz_path())
                .map_err(ClientError::io("removing stale compressed index"))?,
        }
        let index = TarIndex::build(&self.index_tar_path())?;
        self.store_tar_index(&index)?;
        Ok(())
    }

    /// Deletes the cached timestamp and snapshot. Called after a root
    /// rotation: versions keyed to the new root may legitimately regress,
    /// and a compromised old key must not be able to pin versions forever.
    pub fn clear_cache(&self) -> Result<(), ClientError> {
        for role in [RoleName::Timestamp, RoleName::Snapshot] {
            if let Some(path) = self.role_path(role) {
                remove_if_present(&path).map_err(ClientError::io("clearing cached metadata"))?;
            }
        }
        log::debug!("cleared cached timestamp and snapshot");
        Ok(())
    }

    /// Reads one file out of the cached index tarball via the tar index.
    ///
    /// A missing, unreadable, or stale tar index is rebuilt and the lookup
    /// retried once; a tarball that cannot be scanned is fatal.
    pub fn get_from_index(&self, path_in_tar: &str) -> Result<Option<Vec<u8>>, ClientError> {
        let tar_path = self.index_tar_path();
        if !tar_path.exists() {
            return Ok(None);
        }
        let tar_len = fs::metadata(&tar_path)
            .map_err(ClientError::io("reading index tarball metadata"))?
            .len();

        let index = match TarIndex::load(&self.tar_index_path()) {
            Some(index) if index.tar_len == tar_len => index,
            _ => {
                log::debug!("rebuilding tar index");
                let index = TarIndex::build(&tar_path)?;
                self.store_tar_index(&index)?;
                index
            }
        };
        index.read_entry(&tar_path, path_in_tar)
    }

    fn store_tar_index(&self, index: &TarIndex) -> Result<(), ClientError> {
        let bytes = index.to_bytes()?;
        let temp = NamedTempFile::new_in(&self.dir)
            .map_err(ClientError::io("creating tar index temp file"))?;
        fs::write(temp.path(), &bytes).map_err(ClientError::io("writing tar index"))?;
        temp.persist(self.tar_index_path())
            .map_err(|e| ClientError::io("installing tar index")(e.error))?;
        Ok(())
    }

    /// Copies `src` into the cache directory and renames it over `dest`.
    fn install(&self, src: &Path, dest: &Path) -> Result<(), ClientError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(ClientError::io("creating cache directory"))?;
        }
        let temp = NamedTempFile::new_in(&self.dir)
            .map_err(ClientError::io("creating cache temp file"))?;
        fs::copy(src, temp.path()).map_err(ClientError::io("copying into cache"))?;
        temp.persist(dest)
            .map_err(|e| ClientError::io("installing cache file")(e.error))?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn cache_in(dir: &Path) -> Cache {
        Cache::new(dir.join("cache"), CacheLayout::default()).unwrap()
    }

    #[test]
    fn role_files_appear_only_after_install() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        assert_eq!(cache.get_cached(RoleName::Timestamp), None);

        let staged = dir.path().join("timestamp.json.part");
        fs::write(&staged, b"{}").unwrap();
        cache.cache_role_file(&staged, RoleName::Timestamp).unwrap();

        let cached = cache.get_cached(RoleName::Timestamp).unwrap();
        assert_eq!(fs::read(cached).unwrap(), b"{}");
    }

    #[test]
    fn clear_cache_removes_timestamp_and_snapshot_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        for role in [RoleName::Root, RoleName::Timestamp, RoleName::Snapshot, RoleName::Mirrors] {
            let staged = dir.path().join("staged");
            fs::write(&staged, b"{}").unwrap();
            cache.cache_role_file(&staged, role).unwrap();
        }

        cache.clear_cache().unwrap();

        assert!(cache.get_cached(RoleName::Root).is_some());
        assert!(cache.get_cached(RoleName::Mirrors).is_some());
        assert_eq!(cache.get_cached(RoleName::Timestamp), None);
        assert_eq!(cache.get_cached(RoleName::Snapshot), None);
        // clearing an already-clear cache is fine
        cache.clear_cache().unwrap();
    }

    #[test]
    fn index_install_builds_the_tar_index() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let tar = dir.path().join("index.tar.part");
        fs::write(
            &tar,
            testutil::build_tar(&[("pkg-1/package.json", b"{\"v\":1}".to_vec())]),
        )
        .unwrap();

        cache.cache_index(&tar, None).unwrap();
        assert_eq!(
            cache.get_from_index("pkg-1/package.json").unwrap(),
            Some(b"{\"v\":1}".to_vec())
        );
        assert_eq!(cache.get_from_index("pkg-2/package.json").unwrap(), None);
    }

    #[test]
    fn stale_tar_index_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let tar = dir.path().join("index.tar.part");
        fs::write(
            &tar,
            testutil::build_tar(&[("pkg-1/package.json", b"one".to_vec())]),
        )
        .unwrap();
        cache.cache_index(&tar, None).unwrap();

        // overwrite the sidecar with garbage; lookup must rebuild and succeed
        fs::write(cache.tar_index_path(), b"junk").unwrap();
        assert_eq!(
            cache.get_from_index("pkg-1/package.json").unwrap(),
            Some(b"one".to_vec())
        );
    }

    #[test]
    fn replacing_the_index_drops_a_stale_compressed_form() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        let tar = dir.path().join("index.tar.part");
        let tar_bytes = testutil::build_tar(&[("pkg-1/package.json", b"one".to_vec())]);
        fs::write(&tar, &tar_bytes).unwrap();
        let gz = dir.path().join("index.tar.gz.part");
        fs::write(&gz, testutil::gzip(&tar_bytes)).unwrap();
        cache.cache_index(&tar, Some(&gz)).unwrap();
        assert!(cache.index_tar_gz_path().exists());

        // an incremental update installs only the tarball
        let tar2 = dir.path().join("index2.tar.part");
        fs::write(
            &tar2,
            testutil::build_tar(&[
                ("pkg-1/package.json", b"one".to_vec()),
                ("pkg-2/package.json", b"two".to_vec()),
            ]),
        )
        .unwrap();
        cache.cache_index(&tar2, None).unwrap();
        assert!(!cache.index_tar_gz_path().exists());
        assert_eq!(
            cache.get_from_index("pkg-2/package.json").unwrap(),
            Some(b"two".to_vec())
        );
    }
}
