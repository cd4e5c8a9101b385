use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::MirrorConfig;
use crate::downloader::{DownloadOutcome, Downloader};
use crate::encoding::TextKind;
use crate::error::{describe, MirrorError};
use crate::file_manager::FileManager;
use crate::markup_processor::MarkupProcessor;
use crate::progress::ProgressSender;
use crate::session::MirrorSession;
use crate::urls::parse_base;

/// One page to mirror and where to put it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorRequest {
    pub source_url: String,
    pub output_directory: PathBuf,
}

/// What a transport tells its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorReport {
    pub success: bool,
    pub message: String,
}

impl MirrorReport {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    pub fn invalid_url() -> Self {
        Self::failure("Invalid URL")
    }
}

/// Details of a completed run.
#[derive(Debug, Clone)]
pub struct MirrorOutcome {
    pub index_path: PathBuf,
    pub downloads: Vec<DownloadOutcome>,
}

impl MirrorOutcome {
    pub fn failed(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.downloads.iter().filter(|outcome| !outcome.is_success())
    }
}

/// The single capability every transport exposes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MirrorService: Send + Sync {
    /// Mirrors `url`, optionally streaming per-resource progress.
    async fn mirror(&self, url: &str, progress: Option<ProgressSender>) -> MirrorReport;
}

/// Mirror orchestrator: fetch the page, mirror its assets, write `index.html`.
#[derive(Debug, Clone)]
pub struct WebsiteMirror {
    config: MirrorConfig,
    downloader: Downloader,
}

impl WebsiteMirror {
    pub fn new(config: MirrorConfig) -> Result<Self, MirrorError> {
        let downloader = Downloader::new(&config)?;
        Ok(Self { config, downloader })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// A request rooted at the configured output directory.
    pub fn request_for(&self, url: &str) -> MirrorRequest {
        MirrorRequest {
            source_url: url.to_string(),
            output_directory: self.config.output_dir.clone(),
        }
    }

    /// Runs `request` and folds any fatal error into a failure report.
    pub async fn mirror_request(
        &self,
        request: &MirrorRequest,
        progress: Option<ProgressSender>,
    ) -> MirrorReport {
        match self.run(request, progress).await {
            Ok(outcome) => {
                info!(
                    index = ?outcome.index_path,
                    downloads = outcome.downloads.len(),
                    failed = outcome.failed().count(),
                    "Mirror completed"
                );
                MirrorReport::success(format!(
                    "Website content successfully copied to {}",
                    outcome.index_path.display()
                ))
            }
            Err(MirrorError::MissingUrl) => MirrorReport::invalid_url(),
            Err(e) => {
                let message = format!("An error occurred: {}", describe(e));
                error!(url = %request.source_url, "{message}");
                MirrorReport::failure(message)
            }
        }
    }

    /// Performs one mirror run.
    ///
    /// Only a missing or malformed URL, a failed page fetch, or a failure to
    /// write `index.html` is an error; failed assets are listed in the outcome.
    pub async fn run(
        &self,
        request: &MirrorRequest,
        progress: Option<ProgressSender>,
    ) -> Result<MirrorOutcome, MirrorError> {
        let source = request.source_url.trim();
        if source.is_empty() {
            return Err(MirrorError::MissingUrl);
        }
        let base_url = parse_base(source)?;

        info!(url = %base_url, output = ?request.output_directory, "Mirroring page");
        let page = self
            .downloader
            .fetch_text(&base_url, TextKind::Markup)
            .await
            .map_err(|source| MirrorError::PageFetch {
                url: base_url.to_string(),
                source,
            })?;

        let session = MirrorSession::new(
            self.downloader.clone(),
            FileManager::new(&request.output_directory),
            self.config.disambiguate_collisions,
            progress,
        );

        let rewritten = MarkupProcessor::new(&session)
            .process(&page.text, &base_url)
            .await;

        let index_path = session.files().index_path();
        session
            .files()
            .save_bytes(&index_path, &page.encode(&rewritten))
            .await?;

        Ok(MirrorOutcome {
            index_path,
            downloads: session.into_outcomes(),
        })
    }
}

#[async_trait]
impl MirrorService for WebsiteMirror {
    async fn mirror(&self, url: &str, progress: Option<ProgressSender>) -> MirrorReport {
        self.mirror_request(&self.request_for(url), progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mirror_into(dir: &std::path::Path) -> WebsiteMirror {
        WebsiteMirror::new(MirrorConfig::default().with_output_dir(dir)).unwrap()
    }

    #[test]
    fn test_basic_mirror_setup() {
        let temp_dir = tempdir().unwrap();
        let mirror = mirror_into(temp_dir.path());

        assert_eq!(mirror.config().max_concurrent, 8);
        let request = mirror.request_for("https://example.com");
        assert_eq!(request.source_url, "https://example.com");
        assert_eq!(request.output_directory, temp_dir.path());
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected_without_output() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("out");
        let mirror = mirror_into(&root);

        let report = mirror.mirror("   ", None).await;
        assert_eq!(report, MirrorReport::failure("Invalid URL"));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_malformed_url_is_fatal() {
        let temp_dir = tempdir().unwrap();
        let mirror = mirror_into(temp_dir.path());

        let report = mirror.mirror("not a url", None).await;
        assert!(!report.success);
        assert!(
            report.message.starts_with("An error occurred: invalid URL not a url"),
            "{}",
            report.message
        );
    }

    #[test]
    fn test_report_serializes_to_transport_shape() {
        let json = serde_json::to_value(MirrorReport::success("done")).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "message": "done" }));
    }
}
