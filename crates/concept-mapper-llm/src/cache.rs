//! Write-once response cache keyed by (source id, step).
//!
//! Replaying a cached response makes repeated mapping of the same source id
//! free and deterministic. An existing entry always wins; `put` never
//! overwrites.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

/// Stored in place of a response when the provider's content filter fired.
pub const CONTENT_FILTER_SENTINEL: &str = "*Content filter triggered*";

/// Cache errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cache lock poisoned")]
    Poisoned,

    #[error("Source id {0:?} cannot be used as a cache key")]
    InvalidKey(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub source_id: String,
    /// Zero-based prompt step
    pub step: usize,
}

impl CacheKey {
    pub fn new(source_id: impl Into<String>, step: usize) -> Self {
        Self {
            source_id: source_id.into(),
            step,
        }
    }

    /// File name used by [`FileResponseCache`]. Steps are numbered from 1.
    pub fn file_name(&self) -> String {
        format!("response_{}_s{}.txt", self.source_id, self.step + 1)
    }
}

pub trait ResponseCache {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<String>>;

    /// Store a response. Does nothing when the key already has one.
    fn put(&self, key: &CacheKey, response: &str) -> CacheResult<()>;

    /// Reject keys this cache cannot store.
    fn check_key(&self, _key: &CacheKey) -> CacheResult<()> {
        Ok(())
    }
}

impl<C: ResponseCache + ?Sized> ResponseCache for &C {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &CacheKey, response: &str) -> CacheResult<()> {
        (**self).put(key, response)
    }

    fn check_key(&self, key: &CacheKey) -> CacheResult<()> {
        (**self).check_key(key)
    }
}

impl<C: ResponseCache + ?Sized> ResponseCache for Box<C> {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &CacheKey, response: &str) -> CacheResult<()> {
        (**self).put(key, response)
    }

    fn check_key(&self, key: &CacheKey) -> CacheResult<()> {
        (**self).check_key(key)
    }
}

/// One UTF-8 text file per key.
#[derive(Debug, Clone)]
pub struct FileResponseCache {
    folder: PathBuf,
}

impl FileResponseCache {
    /// Open the cache, creating the folder if needed.
    pub fn new(folder: impl Into<PathBuf>) -> CacheResult<Self> {
        let folder = folder.into();
        fs::create_dir_all(&folder)?;
        Ok(Self { folder })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.folder.join(key.file_name())
    }
}

impl ResponseCache for FileResponseCache {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<String>> {
        self.check_key(key)?;
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &CacheKey, response: &str) -> CacheResult<()> {
        self.check_key(key)?;
        // create_new fails if another writer got there first; that file wins.
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_for(key))
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        file.write_all(response.as_bytes())?;
        Ok(())
    }

    /// The source id becomes part of a file name, so it must not be empty or
    /// contain path separators.
    fn check_key(&self, key: &CacheKey) -> CacheResult<()> {
        let id = key.source_id.as_str();
        if id.is_empty() || id.contains(['/', '\\', '\0']) {
            return Err(CacheError::InvalidKey(key.source_id.clone()));
        }
        Ok(())
    }
}

/// In-process cache, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    entries: Mutex<HashMap<CacheKey, String>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryResponseCache {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &CacheKey, response: &str) -> CacheResult<()> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries
            .entry(key.clone())
            .or_insert_with(|| response.to_string());
        Ok(())
    }
}

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS llm_response (
    source_id TEXT NOT NULL,
    step INTEGER NOT NULL,
    response TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (source_id, step)
);
"#;

/// Responses stored in a SQLite table.
pub struct SqliteResponseCache {
    conn: Connection,
}

impl SqliteResponseCache {
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> CacheResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> CacheResult<Self> {
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> CacheResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM llm_response", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl ResponseCache for SqliteResponseCache {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<String>> {
        let response = self
            .conn
            .query_row(
                "SELECT response FROM llm_response WHERE source_id = ?1 AND step = ?2",
                params![key.source_id, key.step as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(response)
    }

    fn put(&self, key: &CacheKey, response: &str) -> CacheResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO llm_response (source_id, step, response) VALUES (?1, ?2, ?3)",
            params![key.source_id, key.step as i64, response],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_write_once(cache: &dyn ResponseCache) {
        let key = CacheKey::new("42", 0);
        assert_eq!(cache.get(&key).unwrap(), None);

        cache.put(&key, "first").unwrap();
        cache.put(&key, "second").unwrap();
        assert_eq!(cache.get(&key).unwrap().as_deref(), Some("first"));

        let next = CacheKey::new("42", 1);
        assert_eq!(cache.get(&next).unwrap(), None);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(CacheKey::new("123", 0).file_name(), "response_123_s1.txt");
        assert_eq!(CacheKey::new("abc", 2).file_name(), "response_abc_s3.txt");
    }

    #[test]
    fn test_file_cache_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileResponseCache::new(dir.path().join("responses")).unwrap();
        assert!(cache.folder().is_dir());
        check_write_once(&cache);

        let path = cache.path_for(&CacheKey::new("42", 0));
        assert_eq!(fs::read_to_string(path).unwrap(), "first");
    }

    #[test]
    fn test_file_cache_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileResponseCache::new(dir.path().join("responses")).unwrap();

        for id in ["../escape", "a/b", "a\\b", ""] {
            let key = CacheKey::new(id, 0);
            assert!(matches!(cache.check_key(&key), Err(CacheError::InvalidKey(_))));
            assert!(matches!(cache.put(&key, "x"), Err(CacheError::InvalidKey(_))));
            assert!(matches!(cache.get(&key), Err(CacheError::InvalidKey(_))));
        }
        assert!(!dir.path().join("escape").exists());
        assert!(cache.check_key(&CacheKey::new("icd10..I21.9", 0)).is_ok());
        assert!(MemoryResponseCache::new().check_key(&CacheKey::new("a/b", 0)).is_ok());
    }

    #[test]
    fn test_memory_cache_write_once() {
        let cache = MemoryResponseCache::new();
        check_write_once(&cache);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sqlite_cache_write_once() {
        let cache = SqliteResponseCache::open_in_memory().unwrap();
        check_write_once(&cache);
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[test]
    fn test_sqlite_cache_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("responses.db");
        {
            let cache = SqliteResponseCache::open(&path).unwrap();
            cache.put(&CacheKey::new("7", 0), CONTENT_FILTER_SENTINEL).unwrap();
        }
        let cache = SqliteResponseCache::open(&path).unwrap();
        assert_eq!(
            cache.get(&CacheKey::new("7", 0)).unwrap().as_deref(),
            Some(CONTENT_FILTER_SENTINEL)
        );
    }
}
