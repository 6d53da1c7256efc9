//! Core data models for playlist matching.
//!
//! Library records, parsed query lines, scored candidates and the outcome
//! types that flow from Matcher to Resolver to the playlist writers.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Library Models
// ============================================================================

/// File modification time (nanoseconds since epoch) and size, the cache validity key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStamp {
    pub mtime: i64,
    pub size: u64,
}

/// Raw tag values as read from a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub duration: Option<u32>,
}

/// One indexed audio file. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub path: PathBuf,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub duration: Option<u32>,
    pub is_live: bool,
    pub normalized_artist: String,
    pub normalized_title: String,
    pub normalized_filename: String,
    pub stamp: FileStamp,
}

impl TrackRecord {
    /// Raw tags as stored in the cache.
    pub fn tags(&self) -> TrackTags {
        TrackTags {
            artist: self.artist.clone(),
            title: self.title.clone(),
            album: self.album.clone(),
            duration: self.duration,
        }
    }

    /// "Artist - Title" for display, falling back to the file name.
    pub fn display_name(&self) -> String {
        match (self.artist.is_empty(), self.title.is_empty()) {
            (false, false) => format!("{} - {}", self.artist, self.title),
            (true, false) => self.title.clone(),
            _ => self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

// ============================================================================
// Query Models
// ============================================================================

/// One parsed "Artist - Track" line from the input playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLine {
    pub line_no: usize,
    pub raw_text: String,
    pub artist: String,
    pub track: String,
    pub wants_live: bool,
    pub normalized_artist: String,
    pub normalized_track: String,
}

/// A library record scored against a query.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: Arc<TrackRecord>,
    pub base_score: f64,
    pub artist_score: f64,
    pub combined_score: f64,
    pub penalty_applied: bool,
    pub title_distance: usize,
    /// Position of the record in the index, the final tie-break.
    pub order: usize,
}

impl Candidate {
    /// Integer score (0-100) used for threshold and margin comparisons.
    pub fn rounded(&self) -> u8 {
        self.combined_score.round().clamp(0.0, 100.0) as u8
    }
}

/// Result of matching one query against the index.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Resolved(Candidate),
    /// Ranked best first, never empty.
    Ambiguous(Vec<Candidate>),
    NoMatch,
}

impl MatchOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            MatchOutcome::Resolved(_) => "resolved",
            MatchOutcome::Ambiguous(_) => "ambiguous",
            MatchOutcome::NoMatch => "no_match",
        }
    }
}

// ============================================================================
// Resolution Models
// ============================================================================

/// How a track ended up in the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolvedVia {
    Automatic,
    Selected,
    RandomByArtist,
}

/// Why an input line produced no track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    NoMatch,
    UserSkipped,
    NonInteractive,
    InvalidChoice,
    Aborted,
}

impl SkipReason {
    /// Text used in the missing-tracks report.
    pub fn describe(self) -> &'static str {
        match self {
            SkipReason::NoMatch => "No match found in library",
            SkipReason::UserSkipped => "Skipped by user",
            SkipReason::NonInteractive => "No match found (non-interactive)",
            SkipReason::InvalidChoice => "Invalid choice",
            SkipReason::Aborted => "Run aborted before this line",
        }
    }
}

/// Terminal state of the Resolver for one query.
#[derive(Debug, Clone)]
pub enum Resolution {
    Track {
        record: Arc<TrackRecord>,
        via: ResolvedVia,
    },
    Skipped {
        query: QueryLine,
        reason: SkipReason,
    },
}

impl Resolution {
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            Resolution::Skipped {
                reason: SkipReason::Aborted,
                ..
            }
        )
    }

    pub fn record(&self) -> Option<&Arc<TrackRecord>> {
        match self {
            Resolution::Track { record, .. } => Some(record),
            Resolution::Skipped { .. } => None,
        }
    }
}

/// A query paired with its resolution, in input order.
#[derive(Debug, Clone)]
pub struct ResolvedLine {
    pub query: QueryLine,
    pub resolution: Resolution,
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for one run, logged at the end and optionally written as JSON.
#[derive(Default, Debug, Clone, Serialize)]
pub struct RunStats {
    // Library scan
    pub library_files: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub unreadable_files: usize,

    // Input
    pub input_lines: usize,
    pub malformed_lines: usize,

    // Resolution
    pub auto_resolved: usize,
    pub selected: usize,
    pub random_by_artist: usize,
    pub no_match: usize,
    pub user_skipped: usize,
    pub invalid_choice: usize,
    pub aborted: bool,
    pub unprocessed: usize,

    // Timing
    pub scan_seconds: f64,
    pub elapsed_seconds: f64,
}

impl RunStats {
    pub fn resolved(&self) -> usize {
        self.auto_resolved + self.selected + self.random_by_artist
    }

    /// Resolved lines as a percentage of parsed lines.
    pub fn match_rate(&self) -> f64 {
        let total = self.input_lines;
        if total == 0 {
            0.0
        } else {
            100.0 * self.resolved() as f64 / total as f64
        }
    }

    pub fn record(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Track { via, .. } => match via {
                ResolvedVia::Automatic => self.auto_resolved += 1,
                ResolvedVia::Selected => self.selected += 1,
                ResolvedVia::RandomByArtist => self.random_by_artist += 1,
            },
            Resolution::Skipped { reason, .. } => match reason {
                SkipReason::NoMatch | SkipReason::NonInteractive => self.no_match += 1,
                SkipReason::UserSkipped => self.user_skipped += 1,
                SkipReason::InvalidChoice => self.invalid_choice += 1,
                SkipReason::Aborted => self.aborted = true,
            },
        }
    }

    /// Log stats as pretty JSON at info level.
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::normalize::{Normalizer, Role};

    /// Test helper: a record with normalized fields filled from raw text.
    pub(crate) fn record(
        path: &str,
        artist: &str,
        title: &str,
        album: &str,
        live: bool,
    ) -> TrackRecord {
        let normalizer = Normalizer::new::<&str>(&[]).unwrap();
        let stem = std::path::Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        TrackRecord {
            path: PathBuf::from(path),
            artist: artist.to_string(),
            title: title.to_string(),
            album: album.to_string(),
            duration: Some(200),
            is_live: live,
            normalized_artist: normalizer.normalize(artist, Role::Artist).text,
            normalized_title: normalizer.normalize(title, Role::Title).text,
            normalized_filename: normalizer.normalize(&stem, Role::Filename).text,
            stamp: FileStamp::default(),
        }
    }

    #[test]
    fn rounded_clamps_and_rounds() {
        let mut c = Candidate {
            record: Arc::new(record("/m/a.mp3", "A", "B", "", false)),
            base_score: 0.0,
            artist_score: 0.0,
            combined_score: 74.5,
            penalty_applied: false,
            title_distance: 0,
            order: 0,
        };
        assert_eq!(c.rounded(), 75);
        c.combined_score = 74.49;
        assert_eq!(c.rounded(), 74);
        c.combined_score = 100.0;
        assert_eq!(c.rounded(), 100);
    }

    #[test]
    fn display_name_falls_back_to_file_name() {
        let r = record("/m/untagged track.mp3", "", "", "", false);
        assert_eq!(r.display_name(), "untagged track.mp3");
        let r = record("/m/x.mp3", "Queen", "Bohemian Rhapsody", "", false);
        assert_eq!(r.display_name(), "Queen - Bohemian Rhapsody");
    }

    #[test]
    fn stats_count_resolutions() {
        let rec = Arc::new(record("/m/a.mp3", "A", "B", "", false));
        let query = QueryLine {
            line_no: 1,
            raw_text: "A - B".into(),
            artist: "A".into(),
            track: "B".into(),
            wants_live: false,
            normalized_artist: "a".into(),
            normalized_track: "b".into(),
        };
        let mut stats = RunStats {
            input_lines: 4,
            ..Default::default()
        };
        stats.record(&Resolution::Track {
            record: rec.clone(),
            via: ResolvedVia::Automatic,
        });
        stats.record(&Resolution::Track {
            record: rec,
            via: ResolvedVia::RandomByArtist,
        });
        stats.record(&Resolution::Skipped {
            query: query.clone(),
            reason: SkipReason::NonInteractive,
        });
        stats.record(&Resolution::Skipped {
            query,
            reason: SkipReason::Aborted,
        });
        assert_eq!(stats.resolved(), 2);
        assert_eq!(stats.no_match, 1);
        assert!(stats.aborted);
        assert!((stats.match_rate() - 50.0).abs() < f64::EPSILON);
    }
}
