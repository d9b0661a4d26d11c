//! The remote side of the repository: mirror selection and downloads.
//!
//! One mirror is pinned per engine operation; any transport failure moves on
//! to the next mirror and only the final mirror's error propagates. The
//! remote also decides, per index update, whether the tarball can be fetched
//! incrementally or must be downloaded whole.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::NamedTempFile;
use url::Url;

use crate::error::{ClientError, RemoteError, VerificationError};
use crate::metadata::{FileInfo, Mirrors};
use crate::transport::{
    download_bounded, DownloadError, RequestHeader, ResponseInfo, Transport,
};

/// Whether the current download is a first try or a retry after a
/// verification failure (which adds revalidation headers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    AfterVerificationError,
}

/// One mirror pinned for the duration of an engine operation.
#[derive(Debug, Clone)]
pub struct Mirror {
    base: Url,
}

impl Mirror {
    fn new(base: Url) -> Mirror {
        Mirror { base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn join(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| RemoteError(anyhow::Error::new(e)).into())
    }
}

/// How the index tarball will be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMethod {
    /// This file kind is always downloaded whole.
    NeverUpdated,
    /// Fetch only the suffix missing from the local tarball.
    Update { local_len: u64 },
    /// Incremental update is impossible; download the compressed form whole.
    CannotUpdate(UpdateImpossible),
}

/// Why an incremental index update is off the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateImpossible {
    /// The client is configured to always fetch the compressed index.
    CompressedPreferred,
    /// The server has not advertised byte-range support.
    RangesNotSupported,
    /// The snapshot does not list the uncompressed index form.
    UncompressedSizeUnknown,
    /// There is no local tarball to append to.
    NoLocalCopy,
    /// Fetching the suffix would cost at least as much as the compressed
    /// form (or the local tarball is too small or too large to append to).
    NotWorthIt,
}

/// Monotonic record of observed server capabilities. Once a server has
/// advertised byte-range support the flag stays set.
#[derive(Debug, Default)]
struct ServerCaps {
    accept_ranges: AtomicBool,
}

impl ServerCaps {
    fn observe(&self, info: &ResponseInfo) {
        if info.accept_ranges_bytes {
            self.accept_ranges.store(true, Ordering::SeqCst);
        }
    }

    fn accept_ranges(&self) -> bool {
        self.accept_ranges.load(Ordering::SeqCst)
    }
}

pub struct Remote<T> {
    transport: T,
    /// Out-of-band mirrors, consulted before any from the mirror list.
    base_mirrors: Vec<Url>,
    force_compressed_index: bool,
    caps: ServerCaps,
}

impl<T: Transport> Remote<T> {
    pub fn new(transport: T, base_mirrors: Vec<Url>, force_compressed_index: bool) -> Remote<T> {
        let base_mirrors = base_mirrors.into_iter().map(normalize_base).collect();
        Remote {
            transport,
            base_mirrors,
            force_compressed_index,
            caps: ServerCaps::default(),
        }
    }

    /// Mirrors to try, in order: out-of-band mirrors first, then the usable
    /// mirrors of the trusted mirror list, deduplicated preserving first
    /// occurrence.
    pub fn mirror_list(&self, trusted: Option<&Mirrors>) -> Vec<Mirror> {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        let listed = trusted
            .map(|m| m.full_mirrors().cloned().map(normalize_base).collect())
            .unwrap_or_else(Vec::new);
        for base in self.base_mirrors.iter().cloned().chain(listed) {
            if !seen.contains(&base) {
                seen.push(base.clone());
                out.push(Mirror::new(base));
            }
        }
        out
    }

    /// Decides how the index tarball should be fetched this round.
    pub fn index_download_method(
        &self,
        local_len: Option<u64>,
        compressed: &FileInfo,
        uncompressed: Option<&FileInfo>,
        trailer_len: u64,
    ) -> DownloadMethod {
        if self.force_compressed_index {
            return DownloadMethod::CannotUpdate(UpdateImpossible::CompressedPreferred);
        }
        if !self.caps.accept_ranges() {
            return DownloadMethod::CannotUpdate(UpdateImpossible::RangesNotSupported);
        }
        let Some(uncompressed) = uncompressed else {
            return DownloadMethod::CannotUpdate(UpdateImpossible::UncompressedSizeUnknown);
        };
        let Some(local_len) = local_len else {
            return DownloadMethod::CannotUpdate(UpdateImpossible::NoLocalCopy);
        };
        if local_len < trailer_len || local_len > uncompressed.length {
            return DownloadMethod::CannotUpdate(UpdateImpossible::NotWorthIt);
        }
        if uncompressed.length - local_len >= compressed.length {
            return DownloadMethod::CannotUpdate(UpdateImpossible::NotWorthIt);
        }
        DownloadMethod::Update { local_len }
    }

    /// Downloads a whole file from the pinned mirror into `dir`, refusing
    /// bodies larger than `bound` bytes.
    pub async fn download_file(
        &self,
        mirror: &Mirror,
        path: &str,
        bound: u64,
        attempt: Attempt,
        compression_ok: bool,
        dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let uri = mirror.join(path)?;
        let mut headers = vec![RequestHeader::NoTransform];
        if attempt == Attempt::AfterVerificationError {
            headers.push(RequestHeader::MaxAge0);
        }
        if compression_ok {
            headers.push(RequestHeader::ContentCompression);
        }
        let mut response = self
            .transport
            .get(&uri, &headers)
            .await
            .map_err(RemoteError)?;
        self.caps.observe(&response.info);
        self.stream_to_file(response.body.as_mut(), path, bound, dir)
            .await
    }

    /// Downloads `[from, to)` of a file's uncompressed representation.
    /// Ranges are never transfer-compressed.
    pub async fn download_range(
        &self,
        mirror: &Mirror,
        path: &str,
        range: (u64, u64),
        attempt: Attempt,
        dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let uri = mirror.join(path)?;
        let mut headers = vec![RequestHeader::NoTransform];
        if attempt == Attempt::AfterVerificationError {
            headers.push(RequestHeader::MaxAge0);
        }
        let mut response = self
            .transport
            .get_range(&uri, range, &headers)
            .await
            .map_err(RemoteError)?;
        self.caps.observe(&response.info);
        let bound = range.1.saturating_sub(range.0);
        self.stream_to_file(response.body.as_mut(), path, bound, dir)
            .await
    }

    async fn stream_to_file(
        &self,
        body: &mut dyn crate::transport::BodyReader,
        path: &str,
        bound: u64,
        dir: &Path,
    ) -> Result<PathBuf, ClientError> {
        let temp = NamedTempFile::new_in(dir)
            .map_err(ClientError::io("creating download temp file"))?;
        // the temp dir owns cleanup for the whole operation
        let (_, temp_path) = temp
            .keep()
            .map_err(|e| ClientError::io("keeping download temp file")(e.error))?;
        match download_bounded(body, &temp_path, bound).await {
            Ok(n) => {
                log::trace!("downloaded {path} ({n} bytes)");
                Ok(temp_path)
            }
            Err(DownloadError::TooLarge) => Err(VerificationError::FileTooLarge {
                path: path.to_owned(),
            }
            .into()),
            Err(DownloadError::Remote(e)) => Err(RemoteError(e).into()),
            Err(DownloadError::Io(e)) => Err(ClientError::io("writing download")(e)),
        }
    }
}

/// Mirror bases must end in a slash for relative joins to land under them.
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FileInfo, Mirror as MirrorEntry, MirrorContent};
    use crate::transport::InMemoryTransport;
    use chrono::TimeZone;

    const MIB: u64 = 1024 * 1024;
    const TRAILER: u64 = 1024;

    fn remote(accept_ranges: bool) -> Remote<InMemoryTransport> {
        let transport = InMemoryTransport::new();
        transport.set_accept_ranges(accept_ranges);
        Remote::new(
            transport,
            vec![Url::parse("https://mirror.example/repo").unwrap()],
            false,
        )
    }

    async fn observe_caps(remote: &Remote<InMemoryTransport>) {
        remote.transport.put("repo/timestamp.json", b"{}".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let mirror = &remote.mirror_list(None)[0];
        remote
            .download_file(mirror, "timestamp.json", 1024, Attempt::First, true, dir.path())
            .await
            .unwrap();
    }

    fn info(len: u64) -> FileInfo {
        FileInfo::sha256(len, "00".repeat(32))
    }

    #[tokio::test]
    async fn eligible_update_is_incremental() {
        let remote = remote(true);
        observe_caps(&remote).await;
        let method = remote.index_download_method(
            Some(99 * MIB),
            &info(30 * MIB),
            Some(&info(100 * MIB)),
            TRAILER,
        );
        assert_eq!(method, DownloadMethod::Update { local_len: 99 * MIB });
    }

    #[tokio::test]
    async fn no_local_copy_falls_back_to_full_download() {
        let remote = remote(true);
        observe_caps(&remote).await;
        let method =
            remote.index_download_method(None, &info(30 * MIB), Some(&info(100 * MIB)), TRAILER);
        assert_eq!(
            method,
            DownloadMethod::CannotUpdate(UpdateImpossible::NoLocalCopy)
        );
    }

    #[tokio::test]
    async fn ranges_must_have_been_observed() {
        let remote = remote(false);
        observe_caps(&remote).await;
        let method = remote.index_download_method(
            Some(99 * MIB),
            &info(30 * MIB),
            Some(&info(100 * MIB)),
            TRAILER,
        );
        assert_eq!(
            method,
            DownloadMethod::CannotUpdate(UpdateImpossible::RangesNotSupported)
        );
    }

    #[tokio::test]
    async fn large_deltas_are_not_worth_a_range_request() {
        let remote = remote(true);
        observe_caps(&remote).await;
        // 60 MiB remaining vs a 30 MiB compressed download
        let method = remote.index_download_method(
            Some(40 * MIB),
            &info(30 * MIB),
            Some(&info(100 * MIB)),
            TRAILER,
        );
        assert_eq!(
            method,
            DownloadMethod::CannotUpdate(UpdateImpossible::NotWorthIt)
        );
    }

    #[tokio::test]
    async fn unknown_uncompressed_size_forces_full_download() {
        let remote = remote(true);
        observe_caps(&remote).await;
        let method = remote.index_download_method(Some(99 * MIB), &info(30 * MIB), None, TRAILER);
        assert_eq!(
            method,
            DownloadMethod::CannotUpdate(UpdateImpossible::UncompressedSizeUnknown)
        );
    }

    #[tokio::test]
    async fn forced_compression_disables_updates() {
        let transport = InMemoryTransport::new();
        let remote = Remote::new(
            transport,
            vec![Url::parse("https://mirror.example/").unwrap()],
            true,
        );
        let method = remote.index_download_method(
            Some(99 * MIB),
            &info(30 * MIB),
            Some(&info(100 * MIB)),
            TRAILER,
        );
        assert_eq!(
            method,
            DownloadMethod::CannotUpdate(UpdateImpossible::CompressedPreferred)
        );
    }

    #[test]
    fn mirror_order_dedups_preserving_first_occurrence() {
        let transport = InMemoryTransport::new();
        let remote = Remote::new(
            transport,
            vec![
                Url::parse("https://a.example/").unwrap(),
                Url::parse("https://b.example/").unwrap(),
            ],
            false,
        );
        let listed = Mirrors {
            version: 1,
            expires: chrono::Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            mirrors: vec![
                MirrorEntry {
                    urlbase: Url::parse("https://b.example/").unwrap(),
                    content: MirrorContent::Full,
                },
                MirrorEntry {
                    urlbase: Url::parse("https://c.example/").unwrap(),
                    content: MirrorContent::Full,
                },
                MirrorEntry {
                    urlbase: Url::parse("https://d.example/").unwrap(),
                    content: MirrorContent::Unrecognized("archive".to_owned()),
                },
            ],
        };
        let order: Vec<String> = remote
            .mirror_list(Some(&listed))
            .into_iter()
            .map(|m| m.base().host_str().unwrap().to_owned())
            .collect();
        assert_eq!(order, ["a.example", "b.example", "c.example"]);
    }

    #[tokio::test]
    async fn request_headers_follow_the_attempt() {
        let remote = remote(true);
        remote.transport.put("repo/snapshot.json", b"{}".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let mirror = &remote.mirror_list(None)[0];

        remote
            .download_file(mirror, "snapshot.json", 1024, Attempt::First, true, dir.path())
            .await
            .unwrap();
        remote
            .download_file(
                mirror,
                "snapshot.json",
                1024,
                Attempt::AfterVerificationError,
                false,
                dir.path(),
            )
            .await
            .unwrap();

        let log = remote.transport.requests();
        assert!(log[0].headers.contains(&RequestHeader::NoTransform));
        assert!(log[0].headers.contains(&RequestHeader::ContentCompression));
        assert!(!log[0].headers.contains(&RequestHeader::MaxAge0));
        assert!(log[1].headers.contains(&RequestHeader::MaxAge0));
        assert!(!log[1].headers.contains(&RequestHeader::ContentCompression));
    }
}
