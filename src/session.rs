use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};
use url::Url;

use crate::downloader::{Claim, DownloadOutcome, Downloader, ResolvedPathCache};
use crate::file_manager::FileManager;
use crate::html_parser::ResourceKind;
use crate::progress::{MirrorEvent, ProgressSender};
use crate::urls::sanitize_filename;

/// State shared by every processor during one mirror run.
pub struct MirrorSession {
    downloader: Downloader,
    files: FileManager,
    cache: ResolvedPathCache,
    progress: Option<ProgressSender>,
    outcomes: Mutex<Vec<DownloadOutcome>>,
}

impl MirrorSession {
    pub fn new(
        downloader: Downloader,
        files: FileManager,
        disambiguate_collisions: bool,
        progress: Option<ProgressSender>,
    ) -> Self {
        Self {
            downloader,
            files,
            cache: ResolvedPathCache::new(disambiguate_collisions),
            progress,
            outcomes: Mutex::default(),
        }
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    /// Default location of a resource of `kind`, relative to the output root.
    pub fn default_path(kind: ResourceKind, url: &Url) -> PathBuf {
        Path::new(kind.directory()).join(sanitize_filename(url.as_str()))
    }

    pub fn claim(&self, kind: ResourceKind, url: &Url) -> Claim {
        self.cache.claim(url, Self::default_path(kind, url))
    }

    /// Downloads `url` to `relative` under the output root and records the outcome.
    pub async fn download_asset(&self, url: &Url, relative: &Path) {
        let lock = self.cache.write_lock(relative);
        let _writing = lock.lock().await;

        let target = self.files.resolve(relative);
        let outcome = self.downloader.download(url, &target).await;
        self.record(outcome);
    }

    /// Writes already fetched `contents` for `url` to `relative` and records
    /// the outcome.
    pub async fn store(&self, url: &Url, relative: &Path, contents: &[u8]) {
        let lock = self.cache.write_lock(relative);
        let _writing = lock.lock().await;

        let target = self.files.resolve(relative);
        let outcome = match self.files.save_bytes(&target, contents).await {
            Ok(bytes) => DownloadOutcome::success(url, &target, bytes),
            Err(e) => DownloadOutcome::failure(url, &target, e),
        };
        self.record(outcome);
    }

    pub fn record(&self, outcome: DownloadOutcome) {
        if outcome.is_success() {
            debug!(url = %outcome.url, path = ?outcome.local_path, bytes = ?outcome.byte_count, "Downloaded");
        } else {
            warn!(
                url = %outcome.url,
                error = outcome.error_detail.as_deref().unwrap_or_default(),
                "Download failed"
            );
        }

        if let Some(progress) = &self.progress {
            // A receiver that went away only loses notifications.
            let _ = progress.send(MirrorEvent::from(&outcome));
        }

        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(outcome);
    }

    pub fn into_outcomes(self) -> Vec<DownloadOutcome> {
        self.outcomes.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}
