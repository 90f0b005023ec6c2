//! Source handles and the filesystem seam.
//!
//! A `SourceHandle` wraps an opened file; content is memory-mapped on
//! demand so decode jobs get zero-copy access. Tests and embedded callers
//! can construct in-memory handles instead.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

/// Errors from opening or reading a resource source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to map {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

enum SourceData {
    File { file: File, len: u64 },
    Memory(Vec<u8>),
}

/// An opened resource source. Owned by its record for the manager's
/// lifetime; shared with in-flight instantiation jobs via `Arc`.
pub struct SourceHandle {
    path: PathBuf,
    data: SourceData,
}

impl SourceHandle {
    /// Open a file-backed handle.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| SourceError::Open {
                path: path.clone(),
                source,
            })?
            .len();
        Ok(Self {
            path,
            data: SourceData::File { file, len },
        })
    }

    /// Wrap an in-memory payload. Used by tests and callers that already
    /// hold decoded bytes.
    pub fn from_bytes(name: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: name.into(),
            data: SourceData::Memory(bytes),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source length in bytes. Cheap; usable for cost heuristics.
    pub fn len(&self) -> u64 {
        match &self.data {
            SourceData::File { len, .. } => *len,
            SourceData::Memory(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the full source content. File-backed handles are mapped,
    /// not copied.
    pub fn read(&self) -> Result<SourceBytes<'_>, SourceError> {
        match &self.data {
            SourceData::File { file, .. } => {
                // SAFETY: the mapping is read-only and the file is owned by
                // this handle for the lifetime of the returned view.
                let map = unsafe { Mmap::map(file) }.map_err(|source| SourceError::Map {
                    path: self.path.clone(),
                    source,
                })?;
                Ok(SourceBytes::Mapped(map))
            }
            SourceData::Memory(bytes) => Ok(SourceBytes::Borrowed(bytes)),
        }
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

/// Zero-copy view of source content.
pub enum SourceBytes<'a> {
    Mapped(Mmap),
    Borrowed(&'a [u8]),
}

impl std::ops::Deref for SourceBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            SourceBytes::Mapped(map) => map,
            SourceBytes::Borrowed(bytes) => bytes,
        }
    }
}

/// Path resolution seam. The manager only ever opens sources through this
/// trait so hosts can layer in pack files or virtual mounts.
pub trait Filesystem: Send + Sync {
    fn open(&self, path: &str) -> Result<SourceHandle, SourceError>;
}

/// Filesystem rooted at a base directory on the host OS.
pub struct OsFilesystem {
    root: PathBuf,
}

impl OsFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for OsFilesystem {
    fn default() -> Self {
        Self::new(".")
    }
}

impl Filesystem for OsFilesystem {
    fn open(&self, path: &str) -> Result<SourceHandle, SourceError> {
        SourceHandle::open(self.root.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn memory_handle_reads_back() {
        let handle = SourceHandle::from_bytes("mem://a", vec![1, 2, 3]);
        assert_eq!(handle.len(), 3);
        assert_eq!(&*handle.read().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn file_handle_maps_content() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"texels").unwrap();
        let handle = SourceHandle::open(tmp.path()).unwrap();
        assert_eq!(handle.len(), 6);
        assert_eq!(&*handle.read().unwrap(), b"texels");
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let fs = OsFilesystem::default();
        assert!(fs.open("definitely/not/here.ktx2").is_err());
    }
}
