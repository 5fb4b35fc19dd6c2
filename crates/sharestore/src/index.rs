//! In-memory index from share code to stored artifact.
//!
//! Built by one scan of the upload and text directories when the store
//! opens, then kept current by the store on every write. A code is
//! *reserved* before its content is written and only becomes visible to
//! lookups once the content has been published.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use crate::artifact::{parse_file_key, parse_text_key};
use crate::code::ShareCode;
use crate::error::{IoContext, Result};

/// Where the content for a code lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEntry {
    /// `shared_texts/<code>.txt`
    Text,
    /// `uploads/<code>_<original_name>`
    File { original_name: String },
}

#[derive(Debug, Clone)]
enum Slot {
    Reserved,
    /// Published entry and the rescan generation it was published in.
    Ready(IndexEntry, u64),
}

#[derive(Debug, Default)]
struct Slots {
    map: HashMap<ShareCode, Slot>,
    generation: u64,
}

/// Thread-safe code index.
#[derive(Debug, Default)]
pub struct CodeIndex {
    slots: RwLock<Slots>,
}

impl CodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index pre-populated with published entries.
    pub fn from_entries(entries: HashMap<ShareCode, IndexEntry>) -> Self {
        let map = entries
            .into_iter()
            .map(|(code, entry)| (code, Slot::Ready(entry, 0)))
            .collect();
        Self {
            slots: RwLock::new(Slots { map, generation: 0 }),
        }
    }

    /// Published entry for `code`, if any. Reserved codes are not visible.
    pub fn get(&self, code: &ShareCode) -> Option<IndexEntry> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        match slots.map.get(code) {
            Some(Slot::Ready(entry, _)) => Some(entry.clone()),
            _ => None,
        }
    }

    /// Claim `code` for an upload. Returns false if it is taken or reserved.
    pub fn try_reserve(&self, code: &ShareCode) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.map.contains_key(code) {
            return false;
        }
        slots.map.insert(code.clone(), Slot::Reserved);
        true
    }

    /// Make a reserved code visible.
    pub fn publish(&self, code: &ShareCode, entry: IndexEntry) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let generation = slots.generation;
        slots.map.insert(code.clone(), Slot::Ready(entry, generation));
    }

    /// Drop a reservation after a failed write. Published entries are kept.
    pub fn release(&self, code: &ShareCode) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(slots.map.get(code), Some(Slot::Reserved)) {
            slots.map.remove(code);
        }
    }

    /// Start a rescan. Must be called before the directories are read; the
    /// returned generation is handed to [`CodeIndex::replace`].
    pub fn begin_rescan(&self) -> u64 {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.generation += 1;
        slots.generation
    }

    /// Replace published entries with the result of a rescan started at
    /// `generation`.
    ///
    /// In-flight reservations survive, and so do entries published after the
    /// rescan started, since the scan may have missed their files.
    pub fn replace(&self, generation: u64, entries: HashMap<ShareCode, IndexEntry>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.map.retain(|_, slot| match slot {
            Slot::Reserved => true,
            Slot::Ready(_, published) => *published >= generation,
        });
        for (code, entry) in entries {
            match slots.map.get(&code) {
                Some(Slot::Ready(_, published)) if *published >= generation => {}
                _ => {
                    slots.map.insert(code, Slot::Ready(entry, generation));
                }
            }
        }
    }

    /// Number of published entries.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .map
            .values()
            .filter(|s| matches!(s, Slot::Ready(..)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scan the on-disk layout and build index entries.
///
/// Collisions left by older writers are settled the same way lookups always
/// worked: text wins over files, and among files sharing a code the
/// lexicographically smallest name wins.
pub fn scan(uploads_dir: &Path, texts_dir: &Path) -> Result<HashMap<ShareCode, IndexEntry>> {
    let mut files: BTreeMap<ShareCode, Vec<String>> = BTreeMap::new();
    for name in list_file_names(uploads_dir)? {
        if let Some((code, original_name)) = parse_file_key(&name) {
            files.entry(code).or_default().push(original_name.to_string());
        }
    }

    let mut entries = HashMap::new();
    for (code, mut names) in files {
        names.sort();
        if names.len() > 1 {
            tracing::warn!(
                code = %code,
                count = names.len(),
                "several uploads share one code, serving {}",
                names[0]
            );
        }
        let original_name = names.swap_remove(0);
        entries.insert(code, IndexEntry::File { original_name });
    }

    for name in list_file_names(texts_dir)? {
        if let Some(code) = parse_text_key(&name) {
            if let Some(IndexEntry::File { original_name }) = entries.get(&code) {
                tracing::warn!(
                    code = %code,
                    "text and upload {} share one code, text takes precedence",
                    original_name
                );
            }
            entries.insert(code, IndexEntry::Text);
        }
    }

    Ok(entries)
}

/// Regular files in `dir` with UTF-8 names. A missing directory is empty.
fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).io_context("read directory", dir),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.io_context("read directory", dir)?;
        let file_type = entry.file_type().io_context("stat", entry.path())?;
        if !file_type.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => tracing::debug!("skipping non-UTF-8 file name {:?}", raw),
        }
    }
    Ok(names)
}
