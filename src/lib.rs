pub mod cli;
pub mod config;
pub mod css_processor;
pub mod downloader;
pub mod encoding;
pub mod error;
pub mod file_manager;
pub mod html_parser;
pub mod markup_processor;
pub mod mirror;
pub mod progress;
pub mod server;
pub mod session;
pub mod urls;

// Re-export main types for convenience
pub use config::MirrorConfig;
pub use css_processor::{CssProcessor, DocumentLocation};
pub use downloader::{DownloadOutcome, DownloadStatus, Downloader, ResolvedPathCache};
pub use encoding::{TextBody, TextKind};
pub use error::{DownloadError, MirrorError};
pub use file_manager::FileManager;
pub use html_parser::{HtmlParser, ResourceKind, ResourceReference};
pub use markup_processor::MarkupProcessor;
pub use mirror::{MirrorOutcome, MirrorReport, MirrorRequest, MirrorService, WebsiteMirror};
pub use progress::{MirrorEvent, ProgressSender};
pub use session::MirrorSession;
pub use urls::{resolve, sanitize_filename};
