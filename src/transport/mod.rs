//! The transport adapter contract.
//!
//! The engine speaks to mirrors through this trait only; a concrete HTTP
//! client lives outside the crate. The adapter owns transfer compression:
//! when it negotiates a compressed transfer it also decompresses, so the
//! engine always sees the bytes of the requested representation. Range
//! bounds are half-open byte offsets into that representation.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

pub mod in_memory;

pub use in_memory::InMemoryTransport;

/// Request headers the engine may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestHeader {
    /// Ask intermediary caches to revalidate; set on verification retries.
    MaxAge0,
    /// Forbid intermediary transformations; always set.
    NoTransform,
    /// The adapter may negotiate a compressed transfer. Full GETs only,
    /// never ranges — range offsets address the uncompressed form.
    ContentCompression,
}

/// What the adapter observed about a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    /// The server advertised byte-range support.
    pub accept_ranges_bytes: bool,
    /// The transfer was compressed (and has been decompressed).
    pub content_compression: bool,
}

/// Pull-based body: each call yields a non-empty chunk, or an empty chunk
/// at end of body.
#[async_trait]
pub trait BodyReader: Send {
    async fn chunk(&mut self) -> anyhow::Result<Bytes>;
}

pub struct Response {
    pub info: ResponseInfo,
    pub body: Box<dyn BodyReader>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, uri: &Url, headers: &[RequestHeader]) -> anyhow::Result<Response>;

    /// Fetch `[from, to)` of the file's uncompressed representation.
    async fn get_range(
        &self,
        uri: &Url,
        range: (u64, u64),
        headers: &[RequestHeader],
    ) -> anyhow::Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get(&self, uri: &Url, headers: &[RequestHeader]) -> anyhow::Result<Response> {
        (**self).get(uri, headers).await
    }

    async fn get_range(
        &self,
        uri: &Url,
        range: (u64, u64),
        headers: &[RequestHeader],
    ) -> anyhow::Result<Response> {
        (**self).get_range(uri, range, headers).await
    }
}

/// Why a bounded download stopped early.
#[derive(Debug)]
pub(crate) enum DownloadError {
    /// The body exceeded the expected length.
    TooLarge,
    /// The adapter failed mid-body.
    Remote(anyhow::Error),
    Io(std::io::Error),
}

/// Streams a body into `dest`, aborting the moment the cumulative length
/// would exceed `limit`.
pub(crate) async fn download_bounded(
    body: &mut dyn BodyReader,
    dest: &Path,
    limit: u64,
) -> Result<u64, DownloadError> {
    let mut file = fs::File::create(dest).map_err(DownloadError::Io)?;
    let mut written = 0u64;
    loop {
        let chunk = body.chunk().await.map_err(DownloadError::Remote)?;
        if chunk.is_empty() {
            break;
        }
        written += chunk.len() as u64;
        if written > limit {
            return Err(DownloadError::TooLarge);
        }
        file.write_all(&chunk).map_err(DownloadError::Io)?;
    }
    file.flush().map_err(DownloadError::Io)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_download_stops_at_the_limit() {
        let transport = InMemoryTransport::new();
        transport.put("big", vec![7u8; 10_000]);
        let base = Url::parse("https://mirror.example/").unwrap();
        let uri = base.join("big").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");

        let mut response = transport.get(&uri, &[]).await.unwrap();
        let err = download_bounded(response.body.as_mut(), &dest, 4096)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::TooLarge));

        let mut response = transport.get(&uri, &[]).await.unwrap();
        let n = download_bounded(response.body.as_mut(), &dest, 10_000)
            .await
            .unwrap();
        assert_eq!(n, 10_000);
        assert_eq!(fs::read(&dest).unwrap().len(), 10_000);
    }
}
