//! Compressed on-disk storage for captured page markup.
//!
//! Entries live under the data directory at `html/{market}/{url_id}.html.gz`.
//! The relative path is the pointer stored in `url_inventory.html_path`.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors raised by the content store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cached page not found: {0}")]
    NotFound(String),

    #[error("Cached page is corrupt: {pointer}: {reason}")]
    Corrupt { pointer: String, reason: String },

    #[error("Invalid content pointer: {0}")]
    InvalidPointer(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Construct the pointer for a page's cached markup.
pub fn content_pointer(market: &str, url_id: i64) -> String {
    format!("html/{}/{}.html.gz", market, url_id)
}

/// Gzip-compressed page cache rooted at the data directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store markup for a URL and return its pointer.
    ///
    /// The entry is compressed into a temporary file next to its final path
    /// and renamed into place, so readers never observe a partial entry.
    pub fn put(&self, market: &str, url_id: i64, markup: &str) -> Result<String> {
        if market.is_empty() || market.contains(['/', '\\']) || market == "." || market == ".." {
            return Err(StorageError::InvalidPointer(format!("market {:?}", market)));
        }

        let pointer = content_pointer(market, url_id);
        let path = self.resolve(&pointer)?;
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::InvalidPointer(pointer.clone()))?;
        fs::create_dir_all(dir)?;

        let tmp = NamedTempFile::new_in(dir)?;
        let mut encoder = GzEncoder::new(tmp, Compression::default());
        encoder.write_all(markup.as_bytes())?;
        let tmp = encoder.finish()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        Ok(pointer)
    }

    /// Read and decompress the markup behind a pointer.
    pub fn get(&self, pointer: &str) -> Result<String> {
        let path = self.resolve(pointer)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(pointer.to_string()))
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut bytes = Vec::new();
        GzDecoder::new(file)
            .read_to_end(&mut bytes)
            .map_err(|e| StorageError::Corrupt {
                pointer: pointer.to_string(),
                reason: e.to_string(),
            })?;

        String::from_utf8(bytes).map_err(|e| StorageError::Corrupt {
            pointer: pointer.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn exists(&self, pointer: &str) -> bool {
        self.resolve(pointer).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Delete an entry. Removing a missing entry is not an error.
    pub fn remove(&self, pointer: &str) -> Result<()> {
        let path = self.resolve(pointer)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Map a pointer to an absolute path, refusing anything that could
    /// escape the store root.
    fn resolve(&self, pointer: &str) -> Result<PathBuf> {
        let relative = Path::new(pointer);
        let safe = !pointer.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidPointer(pointer.to_string()));
        }
        Ok(self.root.join(relative))
    }
}
