//! Artifact types: what a share code resolves to.
//!
//! [`Artifact`] carries the content itself; [`ArtifactRef`] is the
//! metadata-only view used when the bytes should be streamed from disk
//! instead of loaded into memory.

use crate::code::ShareCode;
use crate::mime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Separator between the code and the original name of an uploaded file.
pub const FILE_SEPARATOR: char = '_';

/// Extension of shared text resources.
pub const TEXT_EXTENSION: &str = "txt";

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    pub code: ShareCode,
    pub original_name: String,
    pub bytes: Vec<u8>,
    pub mime_hint: String,
}

/// A shared text blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextArtifact {
    pub code: ShareCode,
    pub content: String,
}

/// Stored payload referenced by a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    File(FileArtifact),
    Text(TextArtifact),
}

impl Artifact {
    pub fn code(&self) -> &ShareCode {
        match self {
            Artifact::File(f) => &f.code,
            Artifact::Text(t) => &t.code,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::File(_) => ArtifactKind::File,
            Artifact::Text(_) => ArtifactKind::Text,
        }
    }

    pub fn as_file(&self) -> Option<&FileArtifact> {
        match self {
            Artifact::File(f) => Some(f),
            Artifact::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextArtifact> {
        match self {
            Artifact::Text(t) => Some(t),
            Artifact::File(_) => None,
        }
    }
}

/// Which namespace an artifact lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    File,
    Text,
}

/// Where a resolved artifact lives and how to present it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub code: ShareCode,
    pub kind: ArtifactKind,

    /// Path of the stored content.
    pub path: PathBuf,

    /// Suggested download name: the original name for files,
    /// `<code>.txt` for text.
    pub display_name: String,

    pub size_bytes: u64,
    pub mime_hint: String,
}

/// On-disk file name for an upload: `<code>_<original name>`.
pub fn file_key(code: &ShareCode, original_name: &str) -> String {
    format!("{}{}{}", code, FILE_SEPARATOR, original_name)
}

/// On-disk file name for shared text: `<code>.txt`.
pub fn text_key(code: &ShareCode) -> String {
    format!("{}.{}", code, TEXT_EXTENSION)
}

/// Split an upload file name back into code and original name.
///
/// Returns `None` for names that don't follow the `<code>_<name>` layout.
pub fn parse_file_key(key: &str) -> Option<(ShareCode, &str)> {
    let (code, name) = key.split_once(FILE_SEPARATOR)?;
    let code = code.parse().ok()?;
    if name.is_empty() {
        return None;
    }
    Some((code, name))
}

/// Extract the code from a shared text file name.
pub fn parse_text_key(key: &str) -> Option<ShareCode> {
    let (code, ext) = key.rsplit_once('.')?;
    if ext != TEXT_EXTENSION {
        return None;
    }
    code.parse().ok()
}

impl ArtifactRef {
    pub(crate) fn file(
        code: ShareCode,
        path: PathBuf,
        original_name: &str,
        size_bytes: u64,
    ) -> Self {
        Self {
            code,
            kind: ArtifactKind::File,
            path,
            display_name: original_name.to_string(),
            size_bytes,
            mime_hint: mime::mime_hint(original_name).to_string(),
        }
    }

    pub(crate) fn text(code: ShareCode, path: PathBuf, size_bytes: u64) -> Self {
        let display_name = text_key(&code);
        Self {
            code,
            kind: ArtifactKind::Text,
            path,
            display_name,
            size_bytes,
            mime_hint: mime::TEXT_PLAIN.to_string(),
        }
    }
}
