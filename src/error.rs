//! Error types for playlist matching.
//!
//! Only configuration and library-root problems are fatal. Metadata and cache
//! failures are recovered where they happen; malformed input lines are
//! reported and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration. Raised at startup, before any matching occurs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("matching.threshold must be within 0-100, got {0}")]
    InvalidThreshold(i64),

    #[error("matching.live_penalty must be within 0.0-1.0, got {0}")]
    InvalidLivePenalty(f64),

    #[error("matching.margin must be within 0-100, got {0}")]
    InvalidMargin(i64),

    #[error("matching.artist_gate must be within 0-100, got {0}")]
    InvalidArtistGate(i64),

    #[error("matching.title_weight must be within 0.0-1.0, got {0}")]
    InvalidTitleWeight(f64),

    #[error("matching.max_candidates must be at least 1, got {0}")]
    InvalidMaxCandidates(usize),

    #[error("library.extensions must name at least one extension")]
    NoExtensions,

    #[error("invalid live album pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid strip keyword '{0}'")]
    InvalidStripKeyword(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Library scanning errors that prevent building an index at all.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("library root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("library root is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    #[error("cannot resolve library root {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tag extraction failure for a single file. Never fatal.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read tags: {0}")]
    Read(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cache storage failures. The index falls back to fresh extraction.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("inconsistent cache entry for {path}: {reason}")]
    Inconsistent { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A malformed line in the input playlist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("line {line_no}: missing ' - ' separator: '{line}'")]
    MissingSeparator { line_no: usize, line: String },

    #[error("line {line_no}: empty artist or track: '{line}'")]
    EmptyField { line_no: usize, line: String },
}
