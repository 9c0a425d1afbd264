//! Persistent "artist - title" → video URL maps.
//!
//! Two files share this shape: the long-lived match cache and the per-run
//! progress file that is deleted once a compilation finishes. Both are flat
//! JSON objects, rewritten in full on every `put` so a crash right after a
//! resolution never loses it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::model::Track;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed cache file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Key-value store of resolved matches.
pub trait UrlCache {
    fn get(&self, key: &str) -> Option<String>;

    /// Store `url` under `key`. Durable once this returns `Ok`.
    fn put(&mut self, key: &str, url: &str) -> Result<()>;

    /// Drop one entry. Returns true if it existed.
    fn remove(&mut self, key: &str) -> Result<bool>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Characters unsafe in file names and URLs. Everything else, including
// non-Latin scripts, is kept as-is.
static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[#<>:"?*|/\\]"#).unwrap());

/// Strip characters unsafe for file names and URLs, nothing else.
pub fn gentle_clean(text: &str) -> String {
    UNSAFE_CHARS_RE.replace_all(text, "").into_owned()
}

/// Cache key for a track: `"{artist} - {title}"` after gentle cleaning.
pub fn cache_key(track: &Track) -> String {
    format!("{} - {}", gentle_clean(&track.artist), gentle_clean(&track.title))
}

/// A cache backed by a JSON file.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileCache {
    /// Open the cache at `path`. A missing file is an empty cache.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = match fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| CacheError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        log::debug!("Loaded {} cached matches from {}", entries.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the backing file and forget all entries.
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(|source| CacheError::Json {
            path: self.path.clone(),
            source,
        })?;

        // Write-then-rename so a crash mid-write leaves the old file intact
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl UrlCache for JsonFileCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    /// On a failed write the in-memory entry is rolled back too.
    fn put(&mut self, key: &str, url: &str) -> Result<()> {
        let previous = self.entries.insert(key.to_string(), url.to_string());
        if let Err(e) = self.flush() {
            match previous {
                Some(old) => self.entries.insert(key.to_string(), old),
                None => self.entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        let Some(old) = self.entries.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.flush() {
            self.entries.insert(key.to_string(), old);
            return Err(e);
        }
        Ok(true)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Non-persistent cache, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: BTreeMap<String, String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UrlCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, url: &str) -> Result<()> {
        self.entries.insert(key.to_string(), url.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
