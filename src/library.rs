//! Library index: scan a music directory into normalized, artist-bucketed records.

use rayon::prelude::*;
use regex::RegexSet;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};
use walkdir::{DirEntry, WalkDir};

use crate::cache::CacheAdapter;
use crate::error::LibraryError;
use crate::metadata::MetadataReader;
use crate::models::{FileStamp, TrackRecord, TrackTags};
use crate::normalize::{fold_to_ascii, Normalizer, Role};
use crate::progress::{create_progress_bar, create_spinner, format_duration, log_progress};
use crate::scoring::is_close_artist;

// ============================================================================
// Live Detection
// ============================================================================

/// Decides `is_live` for a record from its title, file name and album.
#[derive(Debug, Clone)]
pub struct LiveDetector {
    album_patterns: RegexSet,
}

impl LiveDetector {
    pub fn new(album_patterns: RegexSet) -> Self {
        Self { album_patterns }
    }

    pub fn album_is_live(&self, album: &str) -> bool {
        !album.is_empty() && self.album_patterns.is_match(&fold_to_ascii(album))
    }
}

/// Build a record from raw tags, computing every derived field.
pub fn derive_record(
    path: PathBuf,
    stamp: FileStamp,
    tags: TrackTags,
    normalizer: &Normalizer,
    live: &LiveDetector,
) -> TrackRecord {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let artist = normalizer.normalize(&tags.artist, Role::Artist);
    let title = normalizer.normalize(&tags.title, Role::Title);
    let filename = normalizer.normalize(&stem, Role::Filename);
    let album = normalizer.normalize(&tags.album, Role::Album);

    let is_live = title.had_live_marker
        || filename.had_live_marker
        || album.had_live_marker
        || live.album_is_live(&tags.album);

    TrackRecord {
        path,
        artist: tags.artist,
        title: tags.title,
        album: tags.album,
        duration: tags.duration,
        is_live,
        normalized_artist: artist.text,
        normalized_title: title.text,
        normalized_filename: filename.text,
        stamp,
    }
}

// ============================================================================
// Scanning
// ============================================================================

/// Counters from the last build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub unreadable: usize,
    pub walk_errors: usize,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

fn file_stamp(entry: &DirEntry) -> FileStamp {
    match entry.metadata() {
        Ok(meta) => FileStamp {
            mtime: meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)),
            size: meta.len(),
        },
        Err(_) => FileStamp::default(),
    }
}

/// Walk `root` for audio files with one of `extensions`, following links and
/// skipping hidden entries. Unreadable directory entries are logged and skipped.
fn collect_audio_files(root: &Path, extensions: &[String]) -> (Vec<(PathBuf, FileStamp)>, usize) {
    let spinner = create_spinner("Scanning library");
    let mut files = Vec::new();
    let mut errors = 0;

    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_hidden(e));
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable library entry");
                errors += 1;
                continue;
            }
        };
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push((entry.path().to_path_buf(), file_stamp(&entry)));
            spinner.inc(1);
        }
    }

    spinner.finish_with_message(format!("Found {} audio files", files.len()));
    (files, errors)
}

// ============================================================================
// Index
// ============================================================================

/// Immutable, path-ordered collection of records bucketed by normalized artist.
#[derive(Debug, Default)]
pub struct LibraryIndex {
    records: Vec<Arc<TrackRecord>>,
    by_artist: FxHashMap<String, Vec<usize>>,
    stats: ScanStats,
}

impl LibraryIndex {
    /// Scan `root` and build the index, consulting `cache` before reading tags.
    /// Record paths are absolute even when `root` is relative.
    pub fn build(
        root: &Path,
        extensions: &[String],
        cache: &mut dyn CacheAdapter,
        reader: &dyn MetadataReader,
        normalizer: &Normalizer,
        live: &LiveDetector,
    ) -> Result<Self, LibraryError> {
        if !root.exists() {
            return Err(LibraryError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(LibraryError::RootNotDirectory(root.to_path_buf()));
        }
        // Records carry absolute paths whatever the working directory
        let root = root.canonicalize().map_err(|source| LibraryError::Resolve {
            path: root.to_path_buf(),
            source,
        })?;

        let start = Instant::now();
        let (files, walk_errors) = collect_audio_files(&root, extensions);
        let mut stats = ScanStats {
            files: files.len(),
            walk_errors,
            ..Default::default()
        };

        // Phase 1: cache lookups (single thread, the cache has one owner)
        let mut records: Vec<TrackRecord> = Vec::with_capacity(files.len());
        let mut misses: Vec<(PathBuf, FileStamp)> = Vec::new();
        for (path, stamp) in files {
            match cache.lookup(&path, stamp) {
                Some(cached) => {
                    let tags = cached.tags();
                    records.push(derive_record(path, stamp, tags, normalizer, live));
                }
                None => misses.push((path, stamp)),
            }
        }
        stats.cache_hits = records.len();
        stats.cache_misses = misses.len();

        // Phase 2: read tags for misses in parallel
        let total = misses.len() as u64;
        let pb = create_progress_bar(total, "Reading tags");
        let fresh: Vec<(TrackRecord, bool)> = misses
            .into_par_iter()
            .map(|(path, stamp)| {
                let tags = reader.read(&path);
                let readable = tags.is_some();
                let record = derive_record(path, stamp, tags.unwrap_or_default(), normalizer, live);
                pb.inc(1);
                log_progress("Reading tags", pb.position(), total, 500);
                (record, readable)
            })
            .collect();
        pb.finish_with_message(format!("Read tags for {} files", fresh.len()));

        // Phase 3: store fresh records, flush once
        for (record, readable) in fresh {
            if !readable {
                stats.unreadable += 1;
            }
            cache.store(&record);
            records.push(record);
        }
        if let Err(e) = cache.flush() {
            tracing::warn!(error = %e, "failed to write library cache");
        }

        let index = Self::assemble(records, stats);
        tracing::info!(
            tracks = index.len(),
            artists = index.by_artist.len(),
            cache_hits = stats.cache_hits,
            cache_misses = stats.cache_misses,
            unreadable = stats.unreadable,
            elapsed = %format_duration(start.elapsed()),
            "library indexed"
        );
        Ok(index)
    }

    /// Index over already-built records (tests, alternative sources).
    pub fn from_records(records: Vec<TrackRecord>) -> Self {
        let stats = ScanStats {
            files: records.len(),
            ..Default::default()
        };
        Self::assemble(records, stats)
    }

    fn assemble(mut records: Vec<TrackRecord>, stats: ScanStats) -> Self {
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records.dedup_by(|a, b| a.path == b.path);

        let mut by_artist: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (i, r) in records.iter().enumerate() {
            by_artist
                .entry(r.normalized_artist.clone())
                .or_default()
                .push(i);
        }

        Self {
            records: records.into_iter().map(Arc::new).collect(),
            by_artist,
            stats,
        }
    }

    pub fn records(&self) -> &[Arc<TrackRecord>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn scan_stats(&self) -> ScanStats {
        self.stats
    }

    fn close_buckets<'a>(&'a self, artist: &'a str) -> impl Iterator<Item = &'a Vec<usize>> + 'a {
        self.by_artist
            .iter()
            .filter(move |(name, _)| name.as_str() != artist && is_close_artist(artist, name))
            .map(|(_, ids)| ids)
    }

    fn collect_sorted<'a>(&self, buckets: impl Iterator<Item = &'a Vec<usize>>) -> Vec<(usize, Arc<TrackRecord>)> {
        let mut ids: Vec<usize> = buckets.flatten().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .map(|i| (i, Arc::clone(&self.records[i])))
            .collect()
    }

    /// Records whose artist is `normalized_artist` or close to it, in index
    /// order, paired with their index position.
    pub fn lookup_candidates(&self, normalized_artist: &str) -> Vec<(usize, Arc<TrackRecord>)> {
        if normalized_artist.is_empty() {
            return Vec::new();
        }
        let exact = self.by_artist.get(normalized_artist);
        self.collect_sorted(exact.into_iter().chain(self.close_buckets(normalized_artist)))
    }

    /// Tracks by this artist for random picks: the exact bucket, or the close
    /// buckets when the exact name is not in the library.
    pub fn artist_pool(&self, normalized_artist: &str) -> Vec<Arc<TrackRecord>> {
        if normalized_artist.is_empty() {
            return Vec::new();
        }
        let pool = match self.by_artist.get(normalized_artist) {
            Some(exact) => self.collect_sorted(std::iter::once(exact)),
            None => self.collect_sorted(self.close_buckets(normalized_artist)),
        };
        pool.into_iter().map(|(_, r)| r).collect()
    }
}
