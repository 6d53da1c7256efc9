//! Scoring functions for playlist matching.
//!
//! This module contains:
//! - String similarity ratios (0-100) over normalized text
//! - Artist closeness used for shortlist buckets
//! - The `Scorer`, which turns a (query, record) pair into a `Candidate`

use rustc_hash::FxHashSet;
use std::sync::Arc;

use crate::config::MatchConfig;
use crate::models::{Candidate, QueryLine, TrackRecord};

// ============================================================================
// Thresholds
// ============================================================================

/// Token-sort ratio at which two artist buckets count as the same artist
pub const CLOSE_ARTIST_RATIO: f64 = 85.0;

/// Shorter side of a containment check must be at least this long ("a" is not an artist match)
pub const MIN_CONTAINED_ARTIST_LEN: usize = 3;

// ============================================================================
// Similarity Ratios
// ============================================================================

/// Levenshtein similarity scaled to 0-100. Two empty strings are identical;
/// one empty string matches nothing.
pub fn ratio(a: &str, b: &str) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 100.0,
        (true, false) | (false, true) => 0.0,
        _ => strsim::normalized_levenshtein(a, b) * 100.0,
    }
}

fn sorted_tokens(s: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens
}

/// Ratio after sorting whitespace tokens, so word order does not matter.
/// e.g., "simon and garfunkel" vs "garfunkel and simon" = 100
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a).join(" "), &sorted_tokens(b).join(" "))
}

/// Ratio over the shared tokens plus each side's leftovers; a string that is
/// a token subset of the other scores 100.
/// e.g., "let it be" vs "beatles let it be" = 100
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let set_a: FxHashSet<&str> = a.split_whitespace().collect();
    let set_b: FxHashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return ratio(a.trim(), b.trim());
    }

    let mut common: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let mut only_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let mut only_b: Vec<&str> = set_b.difference(&set_a).copied().collect();
    common.sort_unstable();
    only_a.sort_unstable();
    only_b.sort_unstable();

    let t0 = common.join(" ");
    let t1 = format!("{} {}", t0, only_a.join(" ")).trim().to_string();
    let t2 = format!("{} {}", t0, only_b.join(" ")).trim().to_string();

    let mut best = ratio(&t1, &t2);
    if !t0.is_empty() {
        best = best.max(ratio(&t0, &t1)).max(ratio(&t0, &t2));
    }
    best
}

/// True when `haystack` contains `needle` as whole words.
fn contains_words(haystack: &str, needle: &str) -> bool {
    needle.len() >= MIN_CONTAINED_ARTIST_LEN
        && format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

/// Whether two normalized artist names should share a shortlist.
/// Word-boundary containment either way ("beatles" / "beatles and billy preston")
/// or a high token-sort ratio ("guns n roses" / "guns and roses").
pub fn is_close_artist(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b
        || contains_words(a, b)
        || contains_words(b, a)
        || token_sort_ratio(a, b) >= CLOSE_ARTIST_RATIO
}

// ============================================================================
// Scorer
// ============================================================================

/// Scores records against queries with the configured weights and penalty.
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    title_weight: f64,
    artist_gate: f64,
    live_penalty: f64,
}

impl Scorer {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            title_weight: config.title_weight,
            artist_gate: f64::from(config.artist_gate),
            live_penalty: config.live_penalty,
        }
    }

    /// Score `record` for `query`. With `use_filename` the file stem competes
    /// with the title tag (full-index fallback for untagged or mis-tagged files).
    pub fn score(
        &self,
        query: &QueryLine,
        record: &Arc<TrackRecord>,
        order: usize,
        use_filename: bool,
    ) -> Candidate {
        let track = query.normalized_track.as_str();
        let title_empty = record.normalized_title.is_empty();

        let mut base_score = token_sort_ratio(track, &record.normalized_title);
        if title_empty || use_filename {
            base_score = base_score.max(token_set_ratio(track, &record.normalized_filename));
        }

        let artist_score = if record.normalized_artist.is_empty() {
            token_set_ratio(&query.normalized_artist, &record.normalized_filename)
        } else {
            token_sort_ratio(&query.normalized_artist, &record.normalized_artist)
        };

        let mut combined =
            self.title_weight * base_score + (1.0 - self.title_weight) * artist_score;
        if artist_score < self.artist_gate {
            combined = combined.min(artist_score);
        }

        // Live/studio mismatch in either direction
        let penalty_applied = query.wants_live != record.is_live;
        if penalty_applied {
            combined *= self.live_penalty;
        }

        let compared_title = if title_empty {
            &record.normalized_filename
        } else {
            &record.normalized_title
        };

        Candidate {
            record: Arc::clone(record),
            base_score,
            artist_score,
            combined_score: combined.clamp(0.0, 100.0),
            penalty_applied,
            title_distance: strsim::levenshtein(track, compared_title),
            order,
        }
    }
}
