//! Persistent library index cache.
//!
//! Records are keyed by path and only reused while the file's mtime and size
//! are unchanged. Every cache problem degrades to a miss.

use rusqlite::{params, Connection, OptionalExtension, Row};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::models::{FileStamp, TrackRecord};

/// Storage behind the library index.
pub trait CacheAdapter {
    /// Cached record for `path`, if its stamp still matches.
    fn lookup(&self, path: &Path, stamp: FileStamp) -> Option<TrackRecord>;

    /// Queue a freshly read record. Persisted by [`CacheAdapter::flush`].
    fn store(&mut self, record: &TrackRecord);

    fn flush(&mut self) -> Result<(), CacheError>;
}

// ============================================================================
// Disabled / in-memory
// ============================================================================

/// Never hits, never stores (`--no-cache`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CacheAdapter for NoCache {
    fn lookup(&self, _path: &Path, _stamp: FileStamp) -> Option<TrackRecord> {
        None
    }

    fn store(&mut self, _record: &TrackRecord) {}

    fn flush(&mut self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    records: FxHashMap<PathBuf, TrackRecord>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CacheAdapter for MemoryCache {
    fn lookup(&self, path: &Path, stamp: FileStamp) -> Option<TrackRecord> {
        self.records
            .get(path)
            .filter(|r| r.stamp == stamp)
            .cloned()
    }

    fn store(&mut self, record: &TrackRecord) {
        self.records.insert(record.path.clone(), record.clone());
    }

    fn flush(&mut self) -> Result<(), CacheError> {
        Ok(())
    }
}

// ============================================================================
// SQLite
// ============================================================================

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;

    CREATE TABLE IF NOT EXISTS tracks (
        path TEXT PRIMARY KEY,
        mtime INTEGER NOT NULL, -- nanoseconds since epoch
        size INTEGER NOT NULL,
        artist TEXT NOT NULL,
        title TEXT NOT NULL,
        album TEXT NOT NULL,
        duration INTEGER,
        is_live INTEGER NOT NULL,
        artist_norm TEXT NOT NULL,
        title_norm TEXT NOT NULL,
        filename_norm TEXT NOT NULL
    );";

/// SQLite-backed cache. Stores are buffered and written in one transaction.
pub struct SqliteCache {
    conn: Connection,
    pending: Vec<TrackRecord>,
}

impl SqliteCache {
    /// Open (or create) the cache database, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            pending: Vec::new(),
        })
    }

    pub fn row_count(&self) -> Result<usize, CacheError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn fetch(&self, key: &str) -> Result<Option<TrackRecord>, CacheError> {
        let row = self
            .conn
            .query_row(
                "SELECT path, mtime, size, artist, title, album, duration, is_live,
                        artist_norm, title_norm, filename_norm
                 FROM tracks WHERE path = ?1",
                params![key],
                decode_row,
            )
            .optional()?;
        row.transpose()
    }
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<Result<TrackRecord, CacheError>> {
    let path: String = row.get(0)?;
    let size: i64 = row.get(2)?;
    let duration: Option<i64> = row.get(6)?;

    let size = match u64::try_from(size) {
        Ok(s) => s,
        Err(_) => {
            return Ok(Err(CacheError::Inconsistent {
                path,
                reason: format!("negative size {}", size),
            }))
        }
    };
    let duration = match duration.map(u32::try_from).transpose() {
        Ok(d) => d,
        Err(_) => {
            return Ok(Err(CacheError::Inconsistent {
                path,
                reason: "duration out of range".to_string(),
            }))
        }
    };

    Ok(Ok(TrackRecord {
        path: PathBuf::from(&path),
        stamp: FileStamp {
            mtime: row.get(1)?,
            size,
        },
        artist: row.get(3)?,
        title: row.get(4)?,
        album: row.get(5)?,
        duration,
        is_live: row.get(7)?,
        normalized_artist: row.get(8)?,
        normalized_title: row.get(9)?,
        normalized_filename: row.get(10)?,
    }))
}

impl CacheAdapter for SqliteCache {
    fn lookup(&self, path: &Path, stamp: FileStamp) -> Option<TrackRecord> {
        let key = path.to_string_lossy();
        match self.fetch(&key) {
            Ok(Some(record)) if record.stamp == stamp => Some(record),
            Ok(Some(record)) => {
                tracing::debug!(
                    path = %key,
                    cached_mtime = record.stamp.mtime,
                    cached_size = record.stamp.size,
                    "stale cache entry"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path = %key, error = %e, "unusable cache entry, re-reading file");
                None
            }
        }
    }

    fn store(&mut self, record: &TrackRecord) {
        self.pending.push(record.clone());
    }

    fn flush(&mut self) -> Result<(), CacheError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO tracks
                    (path, mtime, size, artist, title, album, duration, is_live,
                     artist_norm, title_norm, filename_norm)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for r in &self.pending {
                stmt.execute(params![
                    r.path.to_string_lossy(),
                    r.stamp.mtime,
                    r.stamp.size as i64,
                    r.artist,
                    r.title,
                    r.album,
                    r.duration,
                    r.is_live,
                    r.normalized_artist,
                    r.normalized_title,
                    r.normalized_filename,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(rows = self.pending.len(), "flushed cache");
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::record;

    fn stamped(path: &str, mtime: i64, size: u64) -> TrackRecord {
        let mut r = record(path, "Queen", "Bohemian Rhapsody", "A Night at the Opera", false);
        r.stamp = FileStamp { mtime, size };
        r
    }

    #[test]
    fn sqlite_round_trip_after_flush() {
        let mut cache = SqliteCache::open_in_memory().unwrap();
        let rec = stamped("/music/queen/bohemian.flac", 100, 4096);
        cache.store(&rec);
        assert!(cache.lookup(&rec.path, rec.stamp).is_none(), "not visible before flush");

        cache.flush().unwrap();
        assert_eq!(cache.row_count().unwrap(), 1);
        assert_eq!(cache.lookup(&rec.path, rec.stamp), Some(rec));
    }

    #[test]
    fn stale_stamp_is_a_miss_and_gets_overwritten() {
        let mut cache = SqliteCache::open_in_memory().unwrap();
        let old = stamped("/music/a.mp3", 100, 10);
        cache.store(&old);
        cache.flush().unwrap();

        let new_stamp = FileStamp { mtime: 100 + 250_000_000, size: 10 };
        assert!(cache.lookup(&old.path, new_stamp).is_none());

        let fresh = stamped("/music/a.mp3", 100 + 250_000_000, 10);
        cache.store(&fresh);
        cache.flush().unwrap();
        assert_eq!(cache.row_count().unwrap(), 1);
        assert!(cache.lookup(&old.path, new_stamp).is_some());
    }

    #[test]
    fn undecodable_row_is_a_miss() {
        let cache = SqliteCache::open_in_memory().unwrap();
        cache
            .conn
            .execute(
                "INSERT INTO tracks VALUES ('/music/bad.mp3', 1, -5, 'a', 't', '', NULL, 0, 'a', 't', 'bad')",
                [],
            )
            .unwrap();
        cache
            .conn
            .execute(
                "INSERT INTO tracks VALUES ('/music/typed.mp3', 1, 5, x'00ff', 't', '', NULL, 0, 'a', 't', 'x')",
                [],
            )
            .unwrap();
        let stamp = FileStamp { mtime: 1, size: 5 };
        assert!(cache.lookup(Path::new("/music/bad.mp3"), stamp).is_none());
        assert!(cache.lookup(Path::new("/music/typed.mp3"), stamp).is_none());
    }

    #[test]
    fn sqlite_file_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("library_index.sqlite");
        let rec = stamped("/music/b.ogg", 5, 6);
        {
            let mut cache = SqliteCache::open(&db).unwrap();
            cache.store(&rec);
            cache.flush().unwrap();
        }
        let cache = SqliteCache::open(&db).unwrap();
        assert_eq!(cache.lookup(&rec.path, rec.stamp), Some(rec));
    }

    #[test]
    fn memory_cache_checks_stamp() {
        let mut cache = MemoryCache::new();
        let rec = stamped("/m/c.mp3", 1, 2);
        cache.store(&rec);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&rec.path, rec.stamp).is_some());
        assert!(cache.lookup(&rec.path, FileStamp { mtime: 1, size: 3 }).is_none());
        assert!(NoCache.lookup(&rec.path, rec.stamp).is_none());
    }
}
