//! In-memory transport for testing and development.
//!
//! Serves a map of path → bytes, records every request so tests can assert
//! what was downloaded and in which order, and can simulate servers without
//! range support or mirrors that are down.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::transport::{BodyReader, RequestHeader, Response, ResponseInfo, Transport};

const CHUNK_LEN: usize = 1024;

/// One observed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// Path component of the requested URI, without the leading slash.
    pub path: String,
    pub host: Option<String>,
    pub range: Option<(u64, u64)>,
    pub headers: Vec<RequestHeader>,
}

#[derive(Default)]
pub struct InMemoryTransport {
    files: Mutex<HashMap<String, Vec<u8>>>,
    accept_ranges: AtomicBool,
    down_hosts: Mutex<HashSet<String>>,
    log: Mutex<Vec<RequestRecord>>,
}

impl InMemoryTransport {
    pub fn new() -> InMemoryTransport {
        InMemoryTransport {
            accept_ranges: AtomicBool::new(true),
            ..InMemoryTransport::default()
        }
    }

    pub fn put(&self, path: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_owned(), bytes);
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    /// Whether responses advertise byte-range support.
    pub fn set_accept_ranges(&self, accept: bool) {
        self.accept_ranges.store(accept, Ordering::SeqCst);
    }

    /// Makes every request to `host` fail with a transport error.
    pub fn set_host_down(&self, host: &str, down: bool) {
        let mut hosts = self.down_hosts.lock().unwrap();
        if down {
            hosts.insert(host.to_owned());
        } else {
            hosts.remove(host);
        }
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Paths requested since the log was last cleared, in order.
    pub fn requested_paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    fn record(&self, uri: &Url, range: Option<(u64, u64)>, headers: &[RequestHeader]) {
        self.log.lock().unwrap().push(RequestRecord {
            path: uri.path().trim_start_matches('/').to_owned(),
            host: uri.host_str().map(str::to_owned),
            range,
            headers: headers.to_vec(),
        });
    }

    fn lookup(&self, uri: &Url) -> anyhow::Result<Vec<u8>> {
        if let Some(host) = uri.host_str() {
            if self.down_hosts.lock().unwrap().contains(host) {
                return Err(anyhow!("host {host} is unreachable"));
            }
        }
        let path = uri.path().trim_start_matches('/');
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {path}"))
    }

    fn response(&self, data: Vec<u8>) -> Response {
        Response {
            info: ResponseInfo {
                accept_ranges_bytes: self.accept_ranges.load(Ordering::SeqCst),
                content_compression: false,
            },
            body: Box::new(MemBody { data, pos: 0 }),
        }
    }
}

struct MemBody {
    data: Vec<u8>,
    pos: usize,
}

#[async_trait]
impl BodyReader for MemBody {
    async fn chunk(&mut self) -> anyhow::Result<Bytes> {
        let end = (self.pos + CHUNK_LEN).min(self.data.len());
        let chunk = Bytes::copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(chunk)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn get(&self, uri: &Url, headers: &[RequestHeader]) -> anyhow::Result<Response> {
        self.record(uri, None, headers);
        let data = self.lookup(uri)?;
        Ok(self.response(data))
    }

    async fn get_range(
        &self,
        uri: &Url,
        range: (u64, u64),
        headers: &[RequestHeader],
    ) -> anyhow::Result<Response> {
        self.record(uri, Some(range), headers);
        let data = self.lookup(uri)?;
        let (from, to) = (range.0 as usize, range.1 as usize);
        if from > to || to > data.len() {
            return Err(anyhow!(
                "range {from}..{to} out of bounds for {} bytes",
                data.len()
            ));
        }
        Ok(self.response(data[from..to].to_vec()))
    }
}
