//! Per-line matching: shortlist, score, rank, classify.

use std::cmp::Ordering;

use crate::config::MatchConfig;
use crate::library::LibraryIndex;
use crate::models::{Candidate, MatchOutcome, QueryLine};
use crate::scoring::Scorer;

/// Matches queries against a library index. Holds no mutable state, so one
/// matcher serves every line.
#[derive(Debug, Clone)]
pub struct Matcher {
    scorer: Scorer,
    threshold: u8,
    margin: u8,
    max_candidates: usize,
}

impl Matcher {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            scorer: Scorer::new(config),
            threshold: config.threshold,
            margin: config.margin,
            max_candidates: config.max_candidates,
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Classify `query` against `index`. Never fails; a query with nothing
    /// above threshold is `NoMatch`.
    pub fn match_query(&self, query: &QueryLine, index: &LibraryIndex) -> MatchOutcome {
        let candidates = self.scored_candidates(query, index);
        tracing::debug!(
            line = query.line_no,
            query = %query.raw_text,
            qualifying = candidates.len(),
            "scored candidates"
        );
        self.classify(candidates)
    }

    /// Every qualifying candidate, ranked best first.
    pub fn scored_candidates(&self, query: &QueryLine, index: &LibraryIndex) -> Vec<Candidate> {
        let shortlist = index.lookup_candidates(&query.normalized_artist);

        let scored: Vec<Candidate> = if shortlist.is_empty() {
            // Artist unknown: untagged or mis-tagged files may still match by file name
            index
                .records()
                .iter()
                .enumerate()
                .map(|(i, r)| self.scorer.score(query, r, i, true))
                .collect()
        } else {
            shortlist
                .iter()
                .map(|(i, r)| self.scorer.score(query, r, *i, false))
                .collect()
        };

        let mut qualifying: Vec<Candidate> = scored
            .into_iter()
            .filter(|c| c.rounded() >= self.threshold)
            .inspect(|c| {
                tracing::debug!(
                    path = %c.record.path.display(),
                    score = c.rounded(),
                    base = c.base_score,
                    artist = c.artist_score,
                    penalty = c.penalty_applied,
                    "candidate"
                )
            })
            .collect();
        qualifying.sort_by(|a, b| rank(query, a, b));
        qualifying
    }

    /// Decide between `Resolved`, `Ambiguous` and `NoMatch` for ranked candidates.
    pub fn classify(&self, mut ranked: Vec<Candidate>) -> MatchOutcome {
        match ranked.len() {
            0 => MatchOutcome::NoMatch,
            1 => MatchOutcome::Resolved(ranked.remove(0)),
            _ => {
                let best = ranked[0].rounded();
                let second = ranked[1].rounded();
                if u16::from(best) >= u16::from(second) + u16::from(self.margin) {
                    MatchOutcome::Resolved(ranked.remove(0))
                } else {
                    ranked.truncate(self.max_candidates);
                    MatchOutcome::Ambiguous(ranked)
                }
            }
        }
    }
}

/// Rounded score desc, live/studio agreement with the query, title edit
/// distance asc, index order asc.
fn rank(query: &QueryLine, a: &Candidate, b: &Candidate) -> Ordering {
    let agrees = |c: &Candidate| c.record.is_live == query.wants_live;
    b.rounded()
        .cmp(&a.rounded())
        .then_with(|| agrees(b).cmp(&agrees(a)))
        .then_with(|| a.title_distance.cmp(&b.title_distance))
        .then_with(|| a.order.cmp(&b.order))
}
