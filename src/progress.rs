use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::downloader::{DownloadOutcome, DownloadStatus};

/// Channel transports subscribe to for per-resource notifications.
pub type ProgressSender = mpsc::UnboundedSender<MirrorEvent>;

/// One finished download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    Downloaded { path: PathBuf },
    Failed { url: String, detail: String },
}

impl fmt::Display for MirrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downloaded { path } => write!(f, "Downloaded: {}", path.display()),
            Self::Failed { url, detail } => write!(f, "Failed to download {url}: {detail}"),
        }
    }
}

impl From<&DownloadOutcome> for MirrorEvent {
    fn from(outcome: &DownloadOutcome) -> Self {
        match outcome.status {
            DownloadStatus::Success => Self::Downloaded {
                path: outcome.local_path.clone(),
            },
            DownloadStatus::Failure => Self::Failed {
                url: outcome.url.clone(),
                detail: outcome.error_detail.clone().unwrap_or_default(),
            },
        }
    }
}
