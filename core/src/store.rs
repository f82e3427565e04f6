//! Persistent storage for raw response bodies.
//!
//! # Design
//! The store is a flat namespace: one entry per `CacheKey`, holding the body
//! exactly as it came off the wire (after gzip decoding). There is no
//! expiry and no size bound; `clear` is the only way entries go away.
//!
//! An entry may carry the `Content-Type` it was served with so a cached body
//! is parsed the same way the network body was. `FileCacheStore` keeps it in
//! a `<key>.type` file next to the body.
//!
//! `FileCacheStore` writes each entry through a temporary file in the cache
//! directory and renames it into place, so a concurrent reader sees either
//! the old body or the new one, never a torn write.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::cache_key::CacheKey;
use crate::error::CacheError;

/// Key-value storage for cached response bodies.
pub trait CacheStore: Send + Sync {
    fn exists(&self, key: &CacheKey) -> bool;

    fn read(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError>;

    /// Store `body` under `key`, replacing any previous entry.
    fn write(&self, key: &CacheKey, body: &[u8]) -> Result<(), CacheError> {
        self.write_entry(key, body, None)
    }

    /// Like `write`, also recording the content type the body was served
    /// with. `None` clears a previously recorded type.
    fn write_entry(
        &self,
        key: &CacheKey,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), CacheError>;

    /// Content type recorded for `key`, if any.
    fn content_type(&self, key: &CacheKey) -> Option<String>;

    /// Remove every entry.
    fn clear(&self) -> Result<(), CacheError>;
}

/// One file per entry inside a dedicated directory.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Open (and create if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        if !dir.is_dir() {
            return Err(CacheError::InvalidDirectory(dir));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    fn type_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}{TYPE_SUFFIX}"))
    }

    fn place(&self, target: PathBuf, contents: &[u8]) -> Result<(), CacheError> {
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(contents)?;
        staged.as_file().sync_all()?;
        staged.persist(target).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}

const TYPE_SUFFIX: &str = ".type";

impl CacheStore for FileCacheStore {
    fn exists(&self, key: &CacheKey) -> bool {
        self.path(key).is_file()
    }

    fn read(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
        fs::read(self.path(key)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CacheError::NotFound(key.clone()),
            _ => CacheError::Io(e),
        })
    }

    fn write_entry(
        &self,
        key: &CacheKey,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), CacheError> {
        match content_type {
            Some(content_type) => self.place(self.type_path(key), content_type.as_bytes())?,
            None => match fs::remove_file(self.type_path(key)) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            },
        }
        self.place(self.path(key), body)?;
        debug!(%key, bytes = body.len(), content_type, "cache entry written");
        Ok(())
    }

    fn content_type(&self, key: &CacheKey) -> Option<String> {
        fs::read_to_string(self.type_path(key)).ok()
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut removed = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        debug!(dir = %self.dir.display(), removed, "cache cleared");
        Ok(())
    }
}

/// In-process store, mostly useful for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, (Vec<u8>, Option<String>)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn exists(&self, key: &CacheKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn read(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|(body, _)| body.clone())
            .ok_or_else(|| CacheError::NotFound(key.clone()))
    }

    fn write_entry(
        &self,
        key: &CacheKey,
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), CacheError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), (body.to_vec(), content_type.map(str::to_string)));
        Ok(())
    }

    fn content_type(&self, key: &CacheKey) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|(_, content_type)| content_type.clone())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
