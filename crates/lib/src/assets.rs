//! # Asset Enumeration
//!
//! Assets are media files on disk. An asset's identity is its file stem, which
//! is also the key used for its document in the feature store.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Asset root not found: {0}")]
    RootNotFound(String),
    #[error("Failed to read asset root '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub id: String,
    pub path: PathBuf,
}

impl Asset {
    /// Builds an asset from a file path, using the file stem as identity.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let id = path.file_stem()?.to_str()?.to_string();
        Some(Self { id, path })
    }

    /// Best-effort MIME type derived from the file extension.
    pub fn mime_type(&self) -> &'static str {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("mp4") => "video/mp4",
            Some("mov") => "video/quicktime",
            Some("webm") => "video/webm",
            Some("avi") => "video/x-msvideo",
            Some("mkv") => "video/x-matroska",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            _ => "application/octet-stream",
        }
    }
}

/// Produces the ordered list of candidate assets for a run.
pub trait AssetSource: Send + Sync {
    fn list(&self) -> Result<Vec<Asset>, AssetError>;
}

impl AssetSource for Vec<Asset> {
    fn list(&self) -> Result<Vec<Asset>, AssetError> {
        Ok(self.clone())
    }
}

/// Lists files with the accepted extensions directly under `root`, sorted by
/// file name.
#[derive(Debug, Clone)]
pub struct DirectoryAssetSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryAssetSource {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

impl AssetSource for DirectoryAssetSource {
    fn list(&self) -> Result<Vec<Asset>, AssetError> {
        if !self.root.is_dir() {
            return Err(AssetError::RootNotFound(self.root.display().to_string()));
        }
        let io_err = |source| AssetError::Io {
            path: self.root.display().to_string(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && self.accepts(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let assets: Vec<Asset> = paths.into_iter().filter_map(Asset::from_path).collect();
        debug!(
            "Found {} assets under {}",
            assets.len(),
            self.root.display()
        );
        Ok(assets)
    }
}
