use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OUTPUT_DIR: &str = "copied_website";
pub const DEFAULT_MAX_CONCURRENT: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = "PageMirror/1.0";

/// Engine settings shared by every transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Root of the mirrored tree (`index.html`, `css/`, `js/`, `images/`).
    pub output_dir: PathBuf,
    /// Upper bound on in-flight network requests per service.
    pub max_concurrent: usize,
    /// Per-request timeout applied by the HTTP client.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Append a short URL hash when two URLs sanitize to the same filename
    /// instead of letting the later download overwrite the earlier one.
    pub disambiguate_collisions: bool,
}

impl MirrorConfig {
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            disambiguate_collisions: false,
        }
    }
}
