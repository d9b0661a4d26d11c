//! The update engine: the client workflow over cache, trust, and remote.
//!
//! `check_for_updates` runs the verification state machine: fetch the
//! timestamp, follow it to the snapshot, and from there to whatever else
//! changed (root, mirror list, package index). Everything downloaded in one
//! iteration is tentative — staged in a per-invocation temp directory and
//! promoted into the cache only when the whole iteration verified. A
//! verification failure triggers a bounded retry loop that first checks
//! whether the root rotated, which is the one legitimate reason previously
//! good keys stop working.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::{NamedTempFile, TempDir};
use url::Url;

use crate::cache::Cache;
use crate::crypto::{self, KeyId};
use crate::error::{ClientError, HistoryEvent, RemoteError, VerificationError};
use crate::layout::{CacheLayout, PackageId, RepoLayout};
use crate::metadata::{
    FileInfo, Mirrors, RawSigned, Role, RoleName, Root, Snapshot, Targets, Timestamp,
};
use crate::remote::{Attempt, DownloadMethod, Mirror, Remote};
use crate::transport::Transport;
use crate::trust::{self, Trusted};

/// Iterations of the retry loop before giving up.
const MAX_ITERATIONS: usize = 5;

/// Hard size bounds for metadata downloaded without a file info in hand.
const ROOT_SIZE_BOUND: u64 = 2 * 1024 * 1024;
const TIMESTAMP_SIZE_BOUND: u64 = 64 * 1024;

/// A tar archive ends in two zero blocks that must be rewritten when
/// appending, so incremental ranges start this far before the local end.
const TAR_TRAILER_LEN: u64 = 1024;

/// Result of a `check_for_updates` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// New metadata was verified and promoted into the cache.
    HasUpdates,
    /// The repository is unchanged since the last check.
    NoUpdates,
}

/// Client configuration. The layouts are data; nothing is hardcoded.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub repo: RepoLayout,
    pub cache: CacheLayout,
    /// Out-of-band mirrors, tried before any from the signed mirror list.
    pub mirrors: Vec<Url>,
    /// Always fetch the compressed index, even when an incremental update
    /// of the uncompressed form would be cheaper.
    pub force_compressed_index: bool,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            repo: RepoLayout::default(),
            cache: CacheLayout::default(),
            mirrors: Vec::new(),
            force_compressed_index: false,
        }
    }
}

/// Control flow of one iteration of the update loop.
enum Abort {
    /// A new root was installed; start over with the new trust anchor.
    RootUpdated,
    /// This iteration failed verification; maybe the root rotated.
    Verification(VerificationError),
    /// Not something another iteration can fix.
    Fatal(ClientError),
}

impl From<ClientError> for Abort {
    fn from(e: ClientError) -> Abort {
        match e {
            ClientError::Verification(v) => Abort::Verification(v),
            other => Abort::Fatal(other),
        }
    }
}

impl From<VerificationError> for Abort {
    fn from(e: VerificationError) -> Abort {
        Abort::Verification(e)
    }
}

/// Index files staged for promotion.
struct StagedIndex {
    tar: PathBuf,
    tar_gz: Option<PathBuf>,
}

pub struct Client<T> {
    remote: Remote<T>,
    cache: Cache,
    layout: RepoLayout,
}

impl<T: Transport> Client<T> {
    pub fn new(
        transport: T,
        cache_dir: impl Into<PathBuf>,
        config: ClientConfig,
    ) -> Result<Client<T>, ClientError> {
        let cache = Cache::new(cache_dir, config.cache)?;
        let remote = Remote::new(transport, config.mirrors, config.force_compressed_index);
        Ok(Client {
            remote,
            cache,
            layout: config.repo,
        })
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Installs the initial root, verified against out-of-band key
    /// fingerprints. A threshold of zero means trust-on-first-use.
    pub async fn bootstrap(
        &mut self,
        trusted_key_ids: &[KeyId],
        threshold: u32,
    ) -> Result<(), ClientError> {
        let mirrors = self.remote.mirror_list(None);
        let (last, rest) = mirrors
            .split_last()
            .ok_or_else(no_mirrors)?;
        for mirror in rest {
            match self.bootstrap_once(mirror, trusted_key_ids, threshold).await {
                Err(e) if e.is_remote() => log_mirror_failure(mirror, &e),
                result => return result,
            }
        }
        self.bootstrap_once(last, trusted_key_ids, threshold).await
    }

    async fn bootstrap_once(
        &self,
        mirror: &Mirror,
        trusted_key_ids: &[KeyId],
        threshold: u32,
    ) -> Result<(), ClientError> {
        let root_path = self.layout.root.clone();
        let staging = new_staging_dir()?;
        log::info!("Downloading {root_path}");
        let file = self
            .remote
            .download_file(
                mirror,
                &root_path,
                ROOT_SIZE_BOUND,
                Attempt::First,
                true,
                staging.path(),
            )
            .await?;
        let raw = parse_remote(&file, &root_path)?;
        trust::verify_fingerprints(trusted_key_ids, threshold, &root_path, &raw)?;
        self.cache.cache_role_file(&file, RoleName::Root)?;
        // force a fresh check against the newly-installed trust anchor
        self.cache.clear_cache()?;
        log::debug!("bootstrap complete");
        Ok(())
    }

    /// Checks the repository for updates and brings the cache up to date.
    ///
    /// `now` enables expiry checking; pass `None` only when the caller has
    /// no trustworthy clock.
    pub async fn check_for_updates(
        &mut self,
        now: Option<DateTime<Utc>>,
    ) -> Result<UpdateOutcome, ClientError> {
        let cached_mirrors = self.load_cached::<Mirrors>()?;
        let mirrors = self
            .remote
            .mirror_list(cached_mirrors.as_ref().map(|m| m.get()));
        let (last, rest) = mirrors.split_last().ok_or_else(no_mirrors)?;
        for mirror in rest {
            match self.check_loop(mirror, now).await {
                Err(e) if e.is_remote() => log_mirror_failure(mirror, &e),
                result => return result,
            }
        }
        self.check_loop(last, now).await
    }

    /// The retry loop: at most `MAX_ITERATIONS` attempts against one mirror,
    /// with a root update between failed attempts. The history of aborted
    /// iterations is surfaced if no attempt succeeds.
    async fn check_loop(
        &mut self,
        mirror: &Mirror,
        now: Option<DateTime<Utc>>,
    ) -> Result<UpdateOutcome, ClientError> {
        let mut history: Vec<HistoryEvent> = Vec::new();
        loop {
            if history.len() >= MAX_ITERATIONS {
                return Err(VerificationError::Loop(history).into());
            }
            let attempt = if history.is_empty() {
                Attempt::First
            } else {
                Attempt::AfterVerificationError
            };
            match self.check_once(mirror, now, attempt).await {
                Ok(outcome) => return Ok(outcome),
                Err(Abort::RootUpdated) => {
                    history.push(HistoryEvent::RootUpdated);
                }
                Err(Abort::Verification(e)) => {
                    log::debug!("update attempt failed verification: {e}");
                    // the failure may mean the root rotated under us
                    self.update_root(mirror, now, Attempt::AfterVerificationError, None)
                        .await?;
                    history.push(HistoryEvent::Verification(e));
                }
                Err(Abort::Fatal(e)) => return Err(e),
            }
        }
    }

    /// One iteration: timestamp → snapshot → (root? mirrors? index?) →
    /// promote. Anything staged is discarded unless the whole iteration
    /// verifies.
    async fn check_once(
        &mut self,
        mirror: &Mirror,
        now: Option<DateTime<Utc>>,
        attempt: Attempt,
    ) -> Result<UpdateOutcome, Abort> {
        let root = self
            .load_cached::<Root>()?
            .ok_or(Abort::Fatal(ClientError::BootstrapRequired))?;
        let cached_ts = self.load_cached::<Timestamp>()?;
        let cached_ss = self.load_cached::<Snapshot>()?;
        let cached_mirrors = self.load_cached::<Mirrors>()?;

        let staging = new_staging_dir()?;

        // timestamp
        let ts_path = self.layout.timestamp.clone();
        let (ts_file, new_ts) = self
            .fetch_role::<Timestamp>(
                mirror,
                attempt,
                &ts_path,
                None,
                TIMESTAMP_SIZE_BOUND,
                &root,
                cached_ts.as_ref().map(|t| t.get().version),
                now,
                staging.path(),
            )
            .await?;

        let ss_path = self.layout.snapshot.clone();
        let new_ss_info = new_ts
            .get()
            .info(&ss_path)
            .ok_or_else(|| VerificationError::UnknownTarget {
                path: ss_path.clone(),
            })?
            .clone();
        if let Some(cts) = &cached_ts {
            if cts.get().info(&ss_path) == Some(&new_ss_info) {
                log::debug!("snapshot unchanged; repository is up to date");
                return Ok(UpdateOutcome::NoUpdates);
            }
        }

        // snapshot
        let (ss_file, new_ss) = self
            .fetch_role::<Snapshot>(
                mirror,
                attempt,
                &ss_path,
                Some(&new_ss_info),
                new_ss_info.length,
                &root,
                cached_ss.as_ref().map(|s| s.get().version),
                now,
                staging.path(),
            )
            .await?;

        // root rotation? compared against the *cached* snapshot; with no
        // cached snapshot the root counts as unchanged, otherwise a fresh
        // bootstrap would loop forever re-installing its own root
        let root_path = self.layout.root.clone();
        let new_root_info = new_ss
            .get()
            .info(&root_path)
            .ok_or_else(|| VerificationError::UnknownTarget {
                path: root_path.clone(),
            })?
            .clone();
        let root_changed = match &cached_ss {
            None => false,
            Some(css) => css.get().info(&root_path) != Some(&new_root_info),
        };
        if root_changed {
            self.update_root(mirror, now, attempt, Some(new_root_info))
                .await?;
            // discard everything staged this iteration and start over
            return Err(Abort::RootUpdated);
        }

        // mirror list; a missing cached copy counts as changed
        let mirrors_path = self.layout.mirrors.clone();
        let new_mirrors_info = new_ss
            .get()
            .info(&mirrors_path)
            .ok_or_else(|| VerificationError::UnknownTarget {
                path: mirrors_path.clone(),
            })?
            .clone();
        let mirrors_changed = self.cache.get_cached(RoleName::Mirrors).is_none()
            || match &cached_ss {
                None => true,
                Some(css) => css.get().info(&mirrors_path) != Some(&new_mirrors_info),
            };
        let mirrors_file = if mirrors_changed {
            let (file, _) = self
                .fetch_role::<Mirrors>(
                    mirror,
                    attempt,
                    &mirrors_path,
                    Some(&new_mirrors_info),
                    new_mirrors_info.length,
                    &root,
                    cached_mirrors.as_ref().map(|m| m.get().version),
                    now,
                    staging.path(),
                )
                .await?;
            Some(file)
        } else {
            None
        };

        // package index; a missing local tarball counts as changed
        let gz_path = self.layout.index_tar_gz.clone();
        let new_gz_info = new_ss
            .get()
            .info(&gz_path)
            .ok_or_else(|| VerificationError::UnknownTarget {
                path: gz_path.clone(),
            })?
            .clone();
        let new_tar_info = new_ss.get().info(&self.layout.index_tar).cloned();
        let index_changed = self.cache.cached_index_len().is_none()
            || match &cached_ss {
                None => true,
                Some(css) => css.get().info(&gz_path) != Some(&new_gz_info),
            };
        let staged_index = if index_changed {
            Some(
                self.update_index(
                    mirror,
                    attempt,
                    &new_gz_info,
                    new_tar_info.as_ref(),
                    staging.path(),
                )
                .await?,
            )
        } else {
            None
        };

        // promote: every download verified, make them visible atomically
        self.cache.cache_role_file(&ts_file, RoleName::Timestamp)?;
        self.cache.cache_role_file(&ss_file, RoleName::Snapshot)?;
        if let Some(file) = mirrors_file {
            self.cache.cache_role_file(&file, RoleName::Mirrors)?;
        }
        if let Some(staged) = staged_index {
            self.cache
                .cache_index(&staged.tar, staged.tar_gz.as_deref())?;
        }
        Ok(UpdateOutcome::HasUpdates)
    }

    /// Downloads a candidate root and installs it if it actually changed.
    ///
    /// `expected` is present exactly when the change was discovered through
    /// a new snapshot; on the retry path there is no file info and the
    /// download is bounded by the root ceiling. Whether the root changed is
    /// then decided by comparing raw bytes — a re-signed root parses
    /// identically to its predecessor but must still replace it.
    async fn update_root(
        &mut self,
        mirror: &Mirror,
        now: Option<DateTime<Utc>>,
        attempt: Attempt,
        expected: Option<FileInfo>,
    ) -> Result<bool, ClientError> {
        let root_path = self.layout.root.clone();
        let current = self
            .load_cached::<Root>()?
            .ok_or(ClientError::BootstrapRequired)?;
        let staging = new_staging_dir()?;

        log::info!("Downloading {root_path}");
        let bound = expected.as_ref().map(|i| i.length).unwrap_or(ROOT_SIZE_BOUND);
        let file = self
            .remote
            .download_file(mirror, &root_path, bound, attempt, true, staging.path())
            .await?;
        if let Some(info) = &expected {
            if !crypto::verify_file_info(&file, info).map_err(ClientError::io("hashing root"))? {
                return Err(VerificationError::FileInfoMismatch { path: root_path }.into());
            }
        }
        let raw = parse_remote(&file, &root_path)?;
        trust::verify_role::<Root>(
            &current,
            &root_path,
            Some(current.get().version),
            now,
            &raw,
        )?;

        let changed = match &expected {
            // reached via a new snapshot: the info already differed
            Some(_) => true,
            None => {
                let cached = self
                    .cache
                    .get_cached(RoleName::Root)
                    .ok_or(ClientError::BootstrapRequired)?;
                let (old_hash, _) =
                    crypto::hash_and_len(&cached).map_err(ClientError::io("hashing cached root"))?;
                let (new_hash, _) =
                    crypto::hash_and_len(&file).map_err(ClientError::io("hashing root"))?;
                old_hash != new_hash
            }
        };

        if changed {
            self.cache.cache_role_file(&file, RoleName::Root)?;
            // the new snapshot's versions are keyed to the new root and may
            // legitimately regress; and a compromised old timestamp or
            // snapshot key must not be able to pin versions at u64::MAX
            self.cache.clear_cache()?;
            log::info!("installed new root metadata");
        }
        Ok(changed)
    }

    /// Brings the index tarball up to date, incrementally when possible.
    async fn update_index(
        &mut self,
        mirror: &Mirror,
        attempt: Attempt,
        gz_info: &FileInfo,
        tar_info: Option<&FileInfo>,
        staging: &Path,
    ) -> Result<StagedIndex, Abort> {
        let local_len = self.cache.cached_index_len();
        let method =
            self.remote
                .index_download_method(local_len, gz_info, tar_info, TAR_TRAILER_LEN);
        log::debug!("index download method: {method:?}");

        if let DownloadMethod::Update { local_len } = method {
            let tar_info = tar_info.ok_or_else(|| {
                // the method decision requires the uncompressed info
                Abort::Fatal(ClientError::corrupted(
                    &self.layout.index_tar,
                    "incremental update chosen without uncompressed file info",
                ))
            })?;
            match self
                .download_index_delta(mirror, attempt, tar_info, local_len, staging)
                .await
            {
                Ok(tar) => {
                    return Ok(StagedIndex { tar, tar_gz: None });
                }
                Err(Abort::Verification(e)) if attempt == Attempt::First => {
                    // let the outer loop retry with revalidation headers
                    return Err(Abort::Verification(e));
                }
                Err(Abort::Verification(e)) => {
                    log::debug!("incremental index update failed again ({e}); downloading in full");
                }
                Err(other) => return Err(other),
            }
        }

        // full download of the compressed form
        let gz_path = self.layout.index_tar_gz.clone();
        log::info!("Downloading {gz_path}");
        let gz = self
            .remote
            .download_file(
                mirror,
                &gz_path,
                gz_info.length,
                attempt,
                false,
                staging,
            )
            .await?;
        if !crypto::verify_file_info(&gz, gz_info)
            .map_err(|e| Abort::Fatal(ClientError::io("hashing index")(e)))?
        {
            return Err(VerificationError::FileInfoMismatch { path: gz_path }.into());
        }
        let tar = gunzip(&gz, &gz_path, staging)?;
        if let Some(info) = tar_info {
            if !crypto::verify_file_info(&tar, info)
                .map_err(|e| Abort::Fatal(ClientError::io("hashing index")(e)))?
            {
                return Err(VerificationError::FileInfoMismatch {
                    path: self.layout.index_tar.clone(),
                }
                .into());
            }
        }
        Ok(StagedIndex {
            tar,
            tar_gz: Some(gz),
        })
    }

    /// Fetches the suffix the local tarball is missing, starting far enough
    /// back to rewrite the zero trailer, and splices it onto the local copy.
    async fn download_index_delta(
        &self,
        mirror: &Mirror,
        attempt: Attempt,
        tar_info: &FileInfo,
        local_len: u64,
        staging: &Path,
    ) -> Result<PathBuf, Abort> {
        let tar_path = self.layout.index_tar.clone();
        let keep = local_len - TAR_TRAILER_LEN;
        log::info!("Downloading {tar_path} (resuming at byte {keep})");
        let delta = self
            .remote
            .download_range(mirror, &tar_path, (keep, tar_info.length), attempt, staging)
            .await?;

        let spliced = splice(&self.cache.index_tar_path(), keep, &delta, staging)?;
        if !crypto::verify_file_info(&spliced, tar_info)
            .map_err(|e| Abort::Fatal(ClientError::io("hashing index")(e)))?
        {
            return Err(VerificationError::FileInfoMismatch { path: tar_path }.into());
        }
        Ok(spliced)
    }

    /// Downloads a package tarball, verified against the index's target
    /// metadata for that package. The package is not cached: the callback
    /// receives a temp path and is responsible for relocating the file.
    pub async fn download_package<R>(
        &mut self,
        pkg: &PackageId,
        callback: impl FnOnce(&Path) -> R,
    ) -> Result<R, ClientError> {
        let cached_mirrors = self.load_cached::<Mirrors>()?;
        let mirrors = self
            .remote
            .mirror_list(cached_mirrors.as_ref().map(|m| m.get()));
        let (last, rest) = mirrors.split_last().ok_or_else(no_mirrors)?;

        let mut fetched = None;
        for mirror in rest {
            match self.fetch_package(mirror, pkg).await {
                Err(e) if e.is_remote() => log_mirror_failure(mirror, &e),
                result => {
                    fetched = Some(result?);
                    break;
                }
            }
        }
        let (_staging, file) = match fetched {
            Some(found) => found,
            None => self.fetch_package(last, pkg).await?,
        };
        Ok(callback(&file))
    }

    async fn fetch_package(
        &self,
        mirror: &Mirror,
        pkg: &PackageId,
    ) -> Result<(TempDir, PathBuf), ClientError> {
        // the per-package target metadata lives inside the verified index,
        // so it is trusted as local data and its signatures are not
        // re-checked here
        let targets_path = self.layout.package_targets_path(pkg);
        let bytes = self
            .cache
            .get_from_index(&targets_path)?
            .ok_or_else(|| ClientError::InvalidPackage(pkg.to_string()))?;
        let raw = RawSigned::parse(&bytes)
            .map_err(|e| ClientError::corrupted(&targets_path, e))?;
        let targets: Targets = raw
            .payload(&targets_path)
            .map_err(|e| ClientError::corrupted(&targets_path, e))?;
        let targets = trust::declare_trusted(targets);

        let tarball_path = self.layout.package_tarball_path(pkg);
        let info = targets
            .get()
            .lookup(&tarball_path)
            .ok_or_else(|| ClientError::InvalidPackage(pkg.to_string()))?
            .clone();

        let staging = new_staging_dir()?;
        log::info!("Downloading {tarball_path}");
        let file = self
            .remote
            .download_file(
                mirror,
                &tarball_path,
                info.length,
                Attempt::First,
                false,
                staging.path(),
            )
            .await?;
        if !crypto::verify_file_info(&file, &info).map_err(ClientError::io("hashing package"))? {
            return Err(VerificationError::FileInfoMismatch { path: tarball_path }.into());
        }
        Ok((staging, file))
    }

    /// Downloads a role file, checks its info when one is expected, and
    /// verifies it against the trusted root's policy.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_role<R: Role>(
        &self,
        mirror: &Mirror,
        attempt: Attempt,
        repo_path: &str,
        expected: Option<&FileInfo>,
        bound: u64,
        root: &Trusted<Root>,
        min_version: Option<u64>,
        now: Option<DateTime<Utc>>,
        staging: &Path,
    ) -> Result<(PathBuf, Trusted<R>), ClientError> {
        log::info!("Downloading {repo_path}");
        let file = self
            .remote
            .download_file(mirror, repo_path, bound, attempt, true, staging)
            .await?;
        if let Some(info) = expected {
            if !crypto::verify_file_info(&file, info)
                .map_err(ClientError::io("hashing download"))?
            {
                return Err(VerificationError::FileInfoMismatch {
                    path: repo_path.to_owned(),
                }
                .into());
            }
        }
        let raw = parse_remote(&file, repo_path)?;
        let verified = trust::verify_role::<R>(root, repo_path, min_version, now, &raw)?;
        Ok((file, verified.into_trusted()))
    }

    /// Loads a role file from the cache and trusts it by provenance: the
    /// cache only ever contains fully-verified payloads.
    fn load_cached<R: Role>(&self) -> Result<Option<Trusted<R>>, ClientError> {
        let Some(path) = self.cache.get_cached(R::NAME) else {
            return Ok(None);
        };
        let label = self
            .layout
            .role_path(R::NAME)
            .map(str::to_owned)
            .unwrap_or_else(|| R::NAME.to_string());
        let bytes = fs::read(&path).map_err(ClientError::io("reading cached metadata"))?;
        let raw =
            RawSigned::parse(&bytes).map_err(|e| ClientError::corrupted(&label, e))?;
        let payload: R = raw
            .payload(&label)
            .map_err(|e| ClientError::corrupted(&label, e))?;
        Ok(Some(trust::declare_trusted(payload)))
    }
}

fn no_mirrors() -> ClientError {
    RemoteError::new("no mirrors configured").into()
}

fn log_mirror_failure(mirror: &Mirror, e: &ClientError) {
    log::debug!("mirror {} failed: {e}; trying the next mirror", mirror.base());
}

fn new_staging_dir() -> Result<TempDir, ClientError> {
    TempDir::new().map_err(ClientError::io("creating staging directory"))
}

fn parse_remote(file: &Path, repo_path: &str) -> Result<RawSigned, ClientError> {
    let bytes = fs::read(file).map_err(ClientError::io("reading download"))?;
    RawSigned::parse(&bytes)
        .map_err(|e| VerificationError::deserialization(repo_path, e).into())
}

/// Decompresses a downloaded `.gz` into the staging directory.
fn gunzip(gz: &Path, gz_repo_path: &str, staging: &Path) -> Result<PathBuf, ClientError> {
    let input = fs::File::open(gz).map_err(ClientError::io("opening compressed index"))?;
    let temp = NamedTempFile::new_in(staging)
        .map_err(ClientError::io("creating staging temp file"))?;
    let (mut out, out_path) = temp
        .keep()
        .map_err(|e| ClientError::io("keeping staging temp file")(e.error))?;
    let mut decoder = flate2::read::GzDecoder::new(input);
    io::copy(&mut decoder, &mut out)
        .map_err(|e| VerificationError::deserialization(gz_repo_path, e))?;
    Ok(out_path)
}

/// Writes `keep` bytes of the local tarball followed by the downloaded
/// delta, producing the candidate new tarball.
fn splice(local_tar: &Path, keep: u64, delta: &Path, staging: &Path) -> Result<PathBuf, ClientError> {
    let temp = NamedTempFile::new_in(staging)
        .map_err(ClientError::io("creating staging temp file"))?;
    let (mut out, out_path) = temp
        .keep()
        .map_err(|e| ClientError::io("keeping staging temp file")(e.error))?;
    let local = fs::File::open(local_tar).map_err(ClientError::io("opening local index"))?;
    let mut prefix = local.take(keep);
    io::copy(&mut prefix, &mut out).map_err(ClientError::io("copying local index prefix"))?;
    let mut delta = fs::File::open(delta).map_err(ClientError::io("opening index delta"))?;
    io::copy(&mut delta, &mut out).map_err(ClientError::io("appending index delta"))?;
    Ok(out_path)
}
