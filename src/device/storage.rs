//! Device storage
//!
//! Maps remote (virtual) paths onto a local directory root and performs the
//! filesystem work behind MAVFTP requests.

use log::info;
use std::fs::{self, File, OpenOptions};
use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;
use crate::protocol::DirectoryEntry;

/// Directory tree exposed as the device filesystem.
#[derive(Debug, Clone)]
pub struct DeviceStorage {
    root: PathBuf,
}

impl DeviceStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Converts a remote path to a path under the root, rejecting traversal.
    /// An empty path or "/" is the root itself.
    pub fn resolve(&self, virtual_path: &str) -> Result<PathBuf, StorageError> {
        if virtual_path.contains('\0') {
            return Err(StorageError::InvalidPath(virtual_path.escape_default().to_string()));
        }

        let mut real = self.root.clone();
        for component in Path::new(virtual_path.trim()).components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => real.push(part),
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(StorageError::PathTraversal(virtual_path.to_string()));
                }
            }
        }
        Ok(real)
    }

    /// Lists the immediate children of a directory, sorted by name.
    pub fn list_directory(&self, virtual_path: &str) -> Result<Vec<DirectoryEntry>, StorageError> {
        let real_path = self.resolve(virtual_path)?;
        if real_path.exists() && !real_path.is_dir() {
            return Err(StorageError::NotADirectory(virtual_path.to_string()));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&real_path)?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                entries.push(DirectoryEntry::directory(name));
            } else {
                entries.push(DirectoryEntry::file(name, metadata.len()));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        info!(
            "Listed directory {} (real: {}) - {} entries",
            virtual_path,
            real_path.display(),
            entries.len()
        );
        Ok(entries)
    }

    /// Creates or truncates a file for writing.
    pub fn create_file(&self, virtual_path: &str) -> Result<File, StorageError> {
        let real_path = self.resolve(virtual_path)?;
        if real_path == self.root {
            return Err(StorageError::InvalidPath(virtual_path.to_string()));
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&real_path)?;
        info!("Created {} (real: {})", virtual_path, real_path.display());
        Ok(file)
    }

    /// Opens an existing file read-only, returning it with its size.
    pub fn open_read(&self, virtual_path: &str) -> Result<(File, u64), StorageError> {
        let real_path = self.resolve(virtual_path)?;
        let file = File::open(&real_path)?;
        let size = file.metadata()?.len();
        info!(
            "Opened {} for reading (real: {}, {} bytes)",
            virtual_path,
            real_path.display(),
            size
        );
        Ok((file, size))
    }
}
