//! CounterStore: one durable integer with serialized increments.
//!
//! The value lives in a text file holding nothing but its decimal digits.
//! The store keeps the current value cached behind a single mutex; every
//! increment happens under that mutex and is flushed to disk before the
//! lock is released, so no two callers ever read the same pre-increment
//! value. Writes go through staging and a rename, so readers of the file
//! never see a half-written number.
//!
//! A counter opened from a read-only [`StoreConfig`] never touches the disk
//! after its first read: increments are kept for the running process only.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::StoreConfig;
use crate::error::{IoContext, Result, ShareError};
use crate::staging;

/// Durable counter backed by a single file.
#[derive(Debug)]
pub struct CounterStore {
    path: PathBuf,
    staging_dir: PathBuf,
    read_only: bool,
    /// `None` until the persisted value has been read.
    cached: Mutex<Option<u64>>,
}

impl CounterStore {
    /// Counter stored at the layout's `counter.txt`.
    pub fn new(config: &StoreConfig) -> Self {
        let counter = Self::at_path(config.counter_path(), config.staging_dir());
        if config.read_only {
            counter.into_read_only()
        } else {
            counter
        }
    }

    /// Counter stored at `path`, staging writes in `staging_dir`.
    pub fn at_path(path: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staging_dir: staging_dir.into(),
            read_only: false,
            cached: Mutex::new(None),
        }
    }

    /// Stop writing to disk. A missing file then reads as 0.
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value. Creates the file with `0` if nothing is persisted yet,
    /// unless the counter is read-only.
    pub fn current_value(&self) -> Result<u64> {
        let mut cached = self.lock();
        self.load(&mut cached)
    }

    /// Add one, persist, and return the new value.
    ///
    /// If persisting fails the new value is still returned and kept for this
    /// process; after a restart the last value that made it to disk wins.
    pub fn increment_and_persist(&self) -> Result<u64> {
        let mut cached = self.lock();
        let next = self.load(&mut cached)? + 1;
        *cached = Some(next);

        if self.read_only {
            tracing::debug!("read-only counter at {}, not persisted", next);
            return Ok(next);
        }
        if let Err(e) = self.persist(next) {
            tracing::warn!("counter value {} not persisted: {}", next, e);
        }
        Ok(next)
    }

    fn lock(&self) -> MutexGuard<'_, Option<u64>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, cached: &mut Option<u64>) -> Result<u64> {
        if let Some(value) = *cached {
            return Ok(value);
        }

        let value = match fs::read_to_string(&self.path) {
            Ok(raw) => parse_counter(&self.path, &raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !self.read_only {
                    self.persist(0)?;
                }
                0
            }
            Err(e) => return Err(e).io_context("read counter", &self.path),
        };

        *cached = Some(value);
        Ok(value)
    }

    fn persist(&self, value: u64) -> Result<()> {
        staging::write_atomic(&self.staging_dir, &self.path, value.to_string().as_bytes())?;
        Ok(())
    }
}

fn parse_counter(path: &Path, raw: &str) -> Result<u64> {
    raw.trim().parse().map_err(|_| ShareError::CorruptCounter {
        path: path.to_path_buf(),
        value: raw.to_string(),
    })
}
