use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, Response};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex as WriteLock, Semaphore};
use tracing::{debug, warn};
use url::Url;

use crate::config::MirrorConfig;
use crate::encoding::{TextBody, TextKind};
use crate::error::{describe, DownloadError, MirrorError};
use crate::file_manager::FileManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DownloadStatus {
    Success,
    Failure,
}

/// Result of one download attempt. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    pub url: String,
    pub local_path: PathBuf,
    pub status: DownloadStatus,
    pub error_detail: Option<String>,
    pub byte_count: Option<u64>,
}

impl DownloadOutcome {
    pub fn success(url: &Url, local_path: &Path, byte_count: u64) -> Self {
        Self {
            url: url.to_string(),
            local_path: local_path.to_path_buf(),
            status: DownloadStatus::Success,
            error_detail: None,
            byte_count: Some(byte_count),
        }
    }

    pub fn failure<E>(url: &Url, local_path: &Path, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            url: url.to_string(),
            local_path: local_path.to_path_buf(),
            status: DownloadStatus::Failure,
            error_detail: Some(describe(err)),
            byte_count: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DownloadStatus::Success
    }
}

/// HTTP fetching for one service, shared by every run it performs.
///
/// The semaphore bounds in-flight requests; a permit is held only for the
/// network transfer itself.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    permits: Arc<Semaphore>,
}

impl Downloader {
    pub fn new(config: &MirrorConfig) -> Result<Self, MirrorError> {
        let client = Self::build_http_client(config).map_err(MirrorError::Client)?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        })
    }

    fn build_http_client(config: &MirrorConfig) -> reqwest::Result<Client> {
        ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .cookie_store(true)
            .build()
    }

    async fn get(&self, url: &Url) -> Result<Response, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }

    /// Fetches a text resource (the page itself or a linked stylesheet),
    /// keeping the raw bytes next to the decoded text.
    pub async fn fetch_text(&self, url: &Url, kind: TextKind) -> Result<TextBody, DownloadError> {
        let _permit = self.permits.acquire().await.ok();
        debug!(url = %url, "Fetching text");

        let response = self.get(url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;

        Ok(TextBody::decode(bytes.to_vec(), content_type.as_deref(), kind))
    }

    /// Streams `url` into `local_path`, creating parent directories first.
    /// The body goes to a `.part` sibling that replaces `local_path` only once
    /// complete.
    ///
    /// Faults are returned as a `Failure` outcome, never as an error.
    pub async fn download(&self, url: &Url, local_path: &Path) -> DownloadOutcome {
        let _permit = self.permits.acquire().await.ok();
        debug!(url = %url, path = ?local_path, "Downloading");

        match self.stream_to_file(url, local_path).await {
            Ok(bytes) => DownloadOutcome::success(url, local_path, bytes),
            Err(e) => DownloadOutcome::failure(url, local_path, e),
        }
    }

    async fn stream_to_file(&self, url: &Url, local_path: &Path) -> Result<u64, DownloadError> {
        let response = self.get(url).await?;

        FileManager::ensure_parent(local_path)
            .await
            .map_err(|e| DownloadError::io(local_path, e))?;
        let partial = partial_path(local_path);
        let file = File::create(&partial)
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;

        let result = match write_body(response, file, url, &partial).await {
            Ok(bytes) => tokio::fs::rename(&partial, local_path)
                .await
                .map(|()| bytes)
                .map_err(|e| DownloadError::io(local_path, e)),
            Err(e) => Err(e),
        };
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&partial).await {
                warn!(path = ?partial, error = %e, "Failed to remove partial download");
            }
        }
        result
    }
}

/// Sanitized names never contain `.`, so this cannot shadow another asset.
fn partial_path(local_path: &Path) -> PathBuf {
    let mut name = local_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    local_path.with_file_name(name)
}

async fn write_body(
    response: Response,
    file: File,
    url: &Url,
    local_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::network(url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(local_path, e))?;
        written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(local_path, e))?;
    Ok(written)
}

/// Outcome of registering a URL with the [`ResolvedPathCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// First sighting: the caller must perform the download.
    New(PathBuf),
    /// Already claimed earlier in the run; no network access needed.
    Existing(PathBuf),
}

impl Claim {
    pub fn path(&self) -> &Path {
        match self {
            Self::New(path) | Self::Existing(path) => path,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}

#[derive(Debug, Default)]
struct CacheState {
    by_url: HashMap<String, PathBuf>,
    by_path: HashMap<PathBuf, String>,
    write_locks: HashMap<PathBuf, Arc<WriteLock<()>>>,
}

/// Per-run mapping from absolute URL to the local path it is stored under.
#[derive(Debug, Default)]
pub struct ResolvedPathCache {
    state: Mutex<CacheState>,
    disambiguate: bool,
}

impl ResolvedPathCache {
    pub fn new(disambiguate: bool) -> Self {
        Self {
            state: Mutex::default(),
            disambiguate,
        }
    }

    /// Registers `url` under `proposed` (relative to the output root) unless it
    /// is already known, in which case the earlier path wins.
    pub fn claim(&self, url: &Url, proposed: PathBuf) -> Claim {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = state.by_url.get(url.as_str()) {
            return Claim::Existing(existing.clone());
        }

        let path = match state.by_path.get(&proposed) {
            Some(owner) if self.disambiguate => {
                debug!(url = %url, owner = %owner, "Disambiguating colliding filename");
                disambiguated(&proposed, url)
            }
            Some(owner) => {
                warn!(url = %url, owner = %owner, path = ?proposed, "Filename collision, later download overwrites");
                proposed
            }
            None => proposed,
        };

        state.by_url.insert(url.to_string(), path.clone());
        state
            .by_path
            .entry(path.clone())
            .or_insert_with(|| url.to_string());
        Claim::New(path)
    }

    /// Lock every write to `path` goes through, so colliding downloads
    /// replace each other whole and in claim order.
    pub fn write_lock(&self, path: &Path) -> Arc<WriteLock<()>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.write_locks.entry(path.to_path_buf()).or_default().clone()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_url
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn disambiguated(path: &Path, url: &Url) -> PathBuf {
    let digest = Sha256::digest(url.as_str().as_bytes());
    let suffix: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();

    let mut name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push('_');
    name.push_str(&suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_second_claim_reuses_path() {
        let cache = ResolvedPathCache::new(false);
        let first = cache.claim(&url("http://x.test/a.png"), PathBuf::from("images/a"));
        let second = cache.claim(&url("http://x.test/a.png"), PathBuf::from("css/a"));

        assert_eq!(first, Claim::New(PathBuf::from("images/a")));
        assert_eq!(second, Claim::Existing(PathBuf::from("images/a")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_collision_overwrites_by_default() {
        let cache = ResolvedPathCache::new(false);
        let first = cache.claim(&url("http://x.test/a-b"), PathBuf::from("js/same"));
        let second = cache.claim(&url("http://x.test/a_b"), PathBuf::from("js/same"));

        assert!(first.is_new());
        assert_eq!(second, Claim::New(PathBuf::from("js/same")));
    }

    #[test]
    fn test_collision_disambiguation_appends_hash() {
        let cache = ResolvedPathCache::new(true);
        cache.claim(&url("http://x.test/a-b"), PathBuf::from("js/same"));
        let second = cache.claim(&url("http://x.test/a_b"), PathBuf::from("js/same"));

        let name = second.path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("same_"), "{name}");
        assert_eq!(name.len(), "same_".len() + 8);
        assert_eq!(second.path().parent().unwrap(), Path::new("js"));

        // Stable for the same URL.
        let again = ResolvedPathCache::new(true);
        again.claim(&url("http://x.test/a-b"), PathBuf::from("js/same"));
        assert_eq!(
            again.claim(&url("http://x.test/a_b"), PathBuf::from("js/same")),
            second
        );
    }

    #[test]
    fn test_write_lock_is_shared_per_path() {
        let cache = ResolvedPathCache::new(false);
        let first = cache.write_lock(Path::new("js/same"));
        let again = cache.write_lock(Path::new("js/same"));
        let other = cache.write_lock(Path::new("js/other"));

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("out/js/http___x_test_a_js")),
            Path::new("out/js/http___x_test_a_js.part")
        );
    }

    #[test]
    fn test_outcome_constructors() {
        let u = url("http://x.test/a.png");
        let ok = DownloadOutcome::success(&u, Path::new("out/images/a"), 12);
        assert!(ok.is_success());
        assert_eq!(ok.byte_count, Some(12));

        let err = DownloadOutcome::failure(
            &u,
            Path::new("out/images/a"),
            DownloadError::HttpStatus {
                url: u.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            },
        );
        assert!(!err.is_success());
        assert_eq!(
            err.error_detail.as_deref(),
            Some("HTTP 404 Not Found for http://x.test/a.png")
        );
    }
}
