//! Staging: write-then-rename so stored content appears all at once.
//!
//! Every write lands in `staging/` under a random name first. Once the bytes
//! are flushed and synced the file is renamed into its final place, which is
//! atomic on a single filesystem. A staging file that is dropped without being
//! published is removed; anything left behind by a crash is swept when the
//! store opens.
//!
//! Layout:
//! ```text
//! {base_path}/
//! ├── uploads/        # published files
//! ├── shared_texts/   # published text
//! └── staging/
//!     └── 3f2a...     # in-flight write
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{IoContext, Result};

/// Random name of an in-flight write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingId(String);

impl StagingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StagingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StagingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file being written in the staging directory.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
    published: bool,
}

impl StagingFile {
    /// Create an empty staging file inside `staging_dir`.
    pub fn create(staging_dir: &Path) -> Result<Self> {
        fs::create_dir_all(staging_dir).io_context("create staging directory", staging_dir)?;

        let path = staging_dir.join(StagingId::new().as_str());
        let file = File::create(&path).io_context("create staging file", &path)?;

        Ok(Self {
            path,
            file: Some(file),
            bytes_written: 0,
            published: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append data to the staging file.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if let Some(ref mut file) = self.file {
            file.write_all(data).io_context("write staging file", &self.path)?;
            self.bytes_written += data.len() as u64;
        }
        Ok(())
    }

    /// Sync the content and rename it to `dest`.
    ///
    /// Returns the number of bytes published.
    pub fn publish(mut self, dest: &Path) -> Result<u64> {
        if let Some(mut file) = self.file.take() {
            file.flush().io_context("flush staging file", &self.path)?;
            file.sync_all().io_context("sync staging file", &self.path)?;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).io_context("create directory", parent)?;
        }

        fs::rename(&self.path, dest).io_context("publish", dest)?;
        self.published = true;
        Ok(self.bytes_written)
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.published {
            self.file = None;
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::debug!("could not remove staging file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Write `data` to `dest` through a staging file in `staging_dir`.
pub fn write_atomic(staging_dir: &Path, dest: &Path, data: &[u8]) -> Result<u64> {
    let mut staged = StagingFile::create(staging_dir)?;
    staged.write(data)?;
    staged.publish(dest)
}

/// Remove leftovers of interrupted writes. Returns how many were removed.
pub fn sweep(staging_dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(staging_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).io_context("read staging directory", staging_dir),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.io_context("read staging directory", staging_dir)?;
        let path = entry.path();
        if path.is_file() {
            fs::remove_file(&path).io_context("remove orphaned staging file", &path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
