//! FileStore: filesystem-backed artifact store addressed by share code.
//!
//! Layout:
//! ```text
//! {base_path}/
//! ├── uploads/
//! │   └── 12345678_report.pdf   # <code>_<original name>
//! ├── shared_texts/
//! │   └── 87654321.txt          # <code>.txt, raw content
//! ├── staging/                  # in-flight writes
//! └── counter.txt
//! ```
//!
//! Lookups go through an in-memory [`CodeIndex`] instead of scanning the
//! directories on every request. Codes are unique across both namespaces:
//! a freshly generated code that is already in use is thrown away and a new
//! one drawn.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifact::{
    file_key, text_key, Artifact, ArtifactKind, ArtifactRef, FileArtifact, TextArtifact,
};
use crate::code::{CodeGenerator, RandomCodeGenerator, ShareCode};
use crate::config::StoreConfig;
use crate::error::{IoContext, Result, ShareError};
use crate::index::{self, CodeIndex, IndexEntry};
use crate::staging;

/// Longest file name most filesystems accept.
const MAX_FILE_NAME_BYTES: usize = 255;

/// Trait for artifact storage backends.
pub trait ArtifactStore: Send + Sync {
    /// Store an uploaded file under a fresh code.
    fn put_file(&self, name: &str, bytes: &[u8]) -> Result<ShareCode>;

    /// Store shared text under a fresh code. Empty text is rejected.
    fn put_text(&self, content: &str) -> Result<ShareCode>;

    /// Load the artifact behind `code`.
    ///
    /// Returns `Ok(None)` if the code is unknown.
    fn resolve(&self, code: &ShareCode) -> Result<Option<Artifact>>;

    /// Find where the artifact behind `code` is stored without reading it.
    ///
    /// Returns `Ok(None)` if the code is unknown.
    fn locate(&self, code: &ShareCode) -> Result<Option<ArtifactRef>>;
}

/// Filesystem-based artifact store.
pub struct FileStore {
    config: StoreConfig,
    index: CodeIndex,
    generator: Arc<dyn CodeGenerator>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("config", &self.config)
            .field("artifacts", &self.index.len())
            .finish()
    }
}

impl FileStore {
    /// Open a store with random code generation.
    ///
    /// Creates the directory layout (unless read-only), sweeps orphaned
    /// staging files and indexes everything already stored.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_generator(config, Arc::new(RandomCodeGenerator))
    }

    /// Open a store that draws codes from `generator`.
    pub fn with_generator(
        config: StoreConfig,
        generator: Arc<dyn CodeGenerator>,
    ) -> Result<Self> {
        if !config.read_only {
            for dir in [config.uploads_dir(), config.texts_dir(), config.staging_dir()] {
                fs::create_dir_all(&dir).io_context("create directory", &dir)?;
            }

            let swept = staging::sweep(&config.staging_dir())?;
            if swept > 0 {
                tracing::info!("removed {} orphaned staging files", swept);
            }
        }

        let entries = index::scan(&config.uploads_dir(), &config.texts_dir())?;
        tracing::debug!(
            "indexed {} artifacts under {}",
            entries.len(),
            config.base_path.display()
        );

        Ok(Self {
            config,
            index: CodeIndex::from_entries(entries),
            generator,
        })
    }

    /// Open a store at a specific path.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(StoreConfig::with_base_path(path))
    }

    /// Open a read-only store at a specific path.
    pub fn read_only_at(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(StoreConfig::read_only(path))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of artifacts currently resolvable.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Rescan the directories and replace the index. Returns the artifact count.
    ///
    /// Writes that finish while the scan runs stay visible.
    pub fn rebuild_index(&self) -> Result<usize> {
        let generation = self.index.begin_rescan();
        let entries = index::scan(&self.config.uploads_dir(), &self.config.texts_dir())?;
        let count = entries.len();
        self.index.replace(generation, entries);
        tracing::info!("rebuilt code index: {} artifacts", count);
        Ok(count)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config.read_only {
            return Err(ShareError::ReadOnly);
        }
        Ok(())
    }

    /// Draw codes until one is free and reserve it.
    fn allocate_code(&self) -> Result<ShareCode> {
        let attempts = self.config.max_code_attempts.max(1);
        for _ in 0..attempts {
            let code = self.generator.generate();
            if self.index.try_reserve(&code) {
                return Ok(code);
            }
            tracing::debug!(code = %code, "generated code already in use, drawing again");
        }
        Err(ShareError::CodeSpaceExhausted { attempts })
    }

    /// Write `data` to `dest` for a reserved code, then publish the code.
    fn commit(
        &self,
        code: &ShareCode,
        dest: &Path,
        data: &[u8],
        entry: IndexEntry,
    ) -> Result<u64> {
        match staging::write_atomic(&self.config.staging_dir(), dest, data) {
            Ok(written) => {
                self.index.publish(code, entry);
                Ok(written)
            }
            Err(e) => {
                self.index.release(code);
                Err(e)
            }
        }
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(ShareError::validation("file name is empty"));
        }
        if name == "." || name == ".." {
            return Err(ShareError::validation("file name is not a file"));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(ShareError::validation(
                "file name must not contain path separators",
            ));
        }
        if file_key_len(name) > MAX_FILE_NAME_BYTES {
            return Err(ShareError::validation("file name is too long"));
        }
        if !self.config.extension_allowed(name) {
            return Err(ShareError::validation(format!(
                "file type of {} is not allowed",
                name
            )));
        }
        Ok(())
    }

    fn text_path(&self, code: &ShareCode) -> PathBuf {
        self.config.texts_dir().join(text_key(code))
    }

    fn file_path(&self, code: &ShareCode, original_name: &str) -> PathBuf {
        self.config.uploads_dir().join(file_key(code, original_name))
    }
}

fn file_key_len(name: &str) -> usize {
    crate::code::CODE_LEN + 1 + name.len()
}

/// Size of the file at `path`, or `None` if it has gone missing.
fn stat_len(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).io_context("stat", path),
    }
}

impl ArtifactStore for FileStore {
    fn put_file(&self, name: &str, bytes: &[u8]) -> Result<ShareCode> {
        self.ensure_writable()?;
        self.validate_name(name)?;

        let code = self.allocate_code()?;
        let dest = self.file_path(&code, name);
        let entry = IndexEntry::File {
            original_name: name.to_string(),
        };
        let written = self.commit(&code, &dest, bytes, entry)?;

        tracing::debug!(code = %code, size = written, "stored file {}", name);
        Ok(code)
    }

    fn put_text(&self, content: &str) -> Result<ShareCode> {
        self.ensure_writable()?;
        if content.is_empty() {
            return Err(ShareError::validation("no text shared"));
        }

        let code = self.allocate_code()?;
        let dest = self.text_path(&code);
        let written = self.commit(&code, &dest, content.as_bytes(), IndexEntry::Text)?;

        tracing::debug!(code = %code, size = written, "stored text");
        Ok(code)
    }

    fn resolve(&self, code: &ShareCode) -> Result<Option<Artifact>> {
        let Some(reference) = self.locate(code)? else {
            return Ok(None);
        };

        let bytes = match fs::read(&reference.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).io_context("read", &reference.path),
        };

        let artifact = match reference.kind {
            ArtifactKind::Text => {
                let content = String::from_utf8(bytes).map_err(|e| ShareError::Storage {
                    op: "decode",
                    path: reference.path.clone(),
                    source: io::Error::new(io::ErrorKind::InvalidData, e),
                })?;
                Artifact::Text(TextArtifact {
                    code: reference.code,
                    content,
                })
            }
            ArtifactKind::File => Artifact::File(FileArtifact {
                code: reference.code,
                original_name: reference.display_name,
                bytes,
                mime_hint: reference.mime_hint,
            }),
        };

        Ok(Some(artifact))
    }

    fn locate(&self, code: &ShareCode) -> Result<Option<ArtifactRef>> {
        let Some(entry) = self.index.get(code) else {
            return Ok(None);
        };

        let path = match &entry {
            IndexEntry::Text => self.text_path(code),
            IndexEntry::File { original_name } => self.file_path(code, original_name),
        };

        let Some(size) = stat_len(&path)? else {
            tracing::warn!(code = %code, "indexed artifact missing on disk: {}", path.display());
            return Ok(None);
        };

        let reference = match entry {
            IndexEntry::Text => ArtifactRef::text(code.clone(), path, size),
            IndexEntry::File { original_name } => {
                ArtifactRef::file(code.clone(), path, &original_name, size)
            }
        };
        Ok(Some(reference))
    }
}
