//! Error types for mirror runs.
//!
//! [`MirrorError`] covers the faults that abort a whole run. [`DownloadError`]
//! covers a single resource and never escapes the downloader boundary as a
//! fault: it is folded into a [`DownloadOutcome`](crate::downloader::DownloadOutcome).

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use thiserror::Error;

/// Faults that abort a mirror run.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The request carried no URL (or only whitespace).
    #[error("no URL provided")]
    MissingUrl,

    /// The page URL could not be parsed as an absolute URL.
    #[error("invalid URL {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The page itself could not be fetched.
    #[error("failed to fetch page {url}")]
    PageFetch {
        url: String,
        #[source]
        source: DownloadError,
    },

    /// The output tree could not be written.
    #[error("IO error writing to {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}

impl MirrorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur while fetching a single resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// DNS failure, refused connection, reset, timeout, broken body stream.
    #[error("network error downloading {url}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The origin answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: StatusCode },

    #[error("IO error writing to {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Renders an error together with its whole source chain, `outer: inner: root`.
pub fn describe<E>(err: E) -> String
where
    E: std::error::Error + Send + Sync + 'static,
{
    format!("{:#}", anyhow::Error::new(err))
}
