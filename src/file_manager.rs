use std::path::{Component, Path, PathBuf};

use tokio::fs;

use crate::error::MirrorError;

pub const INDEX_FILE: &str = "index.html";

/// Owns the layout of one output tree.
///
/// Nothing is created on construction: directories appear only when the first
/// file beneath them is written, so a run that fails before writing leaves no
/// trace on disk.
#[derive(Debug, Clone)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE)
    }

    /// Location on disk of a path relative to the output root.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.base_dir.join(relative)
    }

    /// Creates every missing parent directory of `path`.
    ///
    /// Already existing directories, including ones created concurrently by
    /// another download, are not an error.
    pub async fn ensure_parent(path: &Path) -> std::io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
            _ => Ok(()),
        }
    }

    pub async fn save_text(&self, path: &Path, content: &str) -> Result<u64, MirrorError> {
        self.save_bytes(path, content.as_bytes()).await
    }

    pub async fn save_bytes(&self, path: &Path, content: &[u8]) -> Result<u64, MirrorError> {
        Self::ensure_parent(path)
            .await
            .map_err(|e| MirrorError::io(path, e))?;
        fs::write(path, content)
            .await
            .map_err(|e| MirrorError::io(path, e))?;
        Ok(content.len() as u64)
    }

    /// Reference to `target` as written inside a document stored in
    /// `document_dir`. Both paths are relative to the output root; the result
    /// always uses `/` separators.
    pub fn link_from(document_dir: &Path, target: &Path) -> String {
        let relative =
            pathdiff::diff_paths(target, document_dir).unwrap_or_else(|| target.to_path_buf());

        relative
            .components()
            .filter_map(|component| match component {
                Component::CurDir => None,
                other => Some(other.as_os_str().to_string_lossy()),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}
