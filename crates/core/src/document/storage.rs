//! Whole-buffer byte storage backends.

use crate::error::Result;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Whole-buffer read/write of a document's bytes.
pub trait ByteStorage {
    fn read_all(&self) -> Result<Bytes>;
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
}

/// A file on disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteStorage for FileStorage {
    fn read_all(&self) -> Result<Bytes> {
        Ok(Bytes::from(std::fs::read(&self.path)?))
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        std::fs::write(&self.path, data)?;
        Ok(())
    }
}

/// An in-memory buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Bytes,
}

impl MemoryStorage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl ByteStorage for MemoryStorage {
    fn read_all(&self) -> Result<Bytes> {
        Ok(self.data.clone())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.data = Bytes::copy_from_slice(data);
        Ok(())
    }
}
