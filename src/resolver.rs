//! Ambiguity resolution: turn a `MatchOutcome` into a `Resolution`, asking a
//! `DecisionSource` when the matcher could not decide on its own.
//!
//! ```text
//! Start ─ Resolved ──▶ AutoResolved ─────────────▶ Done(Track/Automatic)
//!       ─ Ambiguous ─▶ AwaitingChoice ──ask──────▶ Done(...)
//!       ─ NoMatch ───▶ AwaitingNoMatchDecision ──▶ Done(...)   (interactive)
//!                  └─────────────────────────────▶ Done(Skipped/NonInteractive)
//! ```

use std::sync::Arc;

use crate::library::LibraryIndex;
use crate::models::{Candidate, MatchOutcome, QueryLine, Resolution, ResolvedVia, SkipReason, TrackRecord};

// ============================================================================
// Decision Source
// ============================================================================

/// A response to a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Zero-based index into `Prompt::candidates`.
    Select(usize),
    Skip,
    RandomByArtist,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Ambiguous,
    NoMatch,
}

/// Everything a decision source needs to present one decision.
#[derive(Debug)]
pub struct Prompt<'a> {
    pub query: &'a QueryLine,
    /// Ranked best first; empty for `PromptKind::NoMatch`.
    pub candidates: &'a [Candidate],
    pub artist_pool_size: usize,
    pub kind: PromptKind,
}

impl Prompt<'_> {
    /// Whether `choice` is a legal answer to this prompt.
    pub fn allows(&self, choice: Choice) -> bool {
        match choice {
            Choice::Select(i) => self.kind == PromptKind::Ambiguous && i < self.candidates.len(),
            Choice::RandomByArtist => self.artist_pool_size > 0,
            Choice::Skip | Choice::Abort => true,
        }
    }
}

/// Where decisions come from: a terminal user, a script, or a fixed policy.
pub trait DecisionSource {
    fn is_interactive(&self) -> bool;

    fn ask(&mut self, prompt: &Prompt<'_>) -> Choice;

    /// Uniform index in `0..pool_len` for a random-by-artist pick. Only
    /// called with `pool_len > 0`.
    fn pick_random(&mut self, pool_len: usize) -> usize;
}

/// Non-interactive policy: take the top ranked candidate of an ambiguous list.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoAccept;

impl DecisionSource for AutoAccept {
    fn is_interactive(&self) -> bool {
        false
    }

    fn ask(&mut self, prompt: &Prompt<'_>) -> Choice {
        match prompt.kind {
            PromptKind::Ambiguous if !prompt.candidates.is_empty() => Choice::Select(0),
            _ => Choice::Skip,
        }
    }

    fn pick_random(&mut self, _pool_len: usize) -> usize {
        0
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug)]
enum State {
    Start(MatchOutcome),
    AutoResolved(Candidate),
    AwaitingChoice(Vec<Candidate>),
    AwaitingNoMatchDecision,
    Done(Resolution),
}

/// Drives one query from matcher outcome to resolution.
pub struct Resolver<'a> {
    index: &'a LibraryIndex,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a LibraryIndex) -> Self {
        Self { index }
    }

    pub fn resolve(
        &self,
        query: &QueryLine,
        outcome: MatchOutcome,
        source: &mut dyn DecisionSource,
    ) -> Resolution {
        let mut state = State::Start(outcome);
        loop {
            state = match state {
                State::Start(MatchOutcome::Resolved(c)) => State::AutoResolved(c),
                State::Start(MatchOutcome::Ambiguous(list)) => State::AwaitingChoice(list),
                State::Start(MatchOutcome::NoMatch) if !source.is_interactive() => {
                    State::Done(skipped(query, SkipReason::NonInteractive))
                }
                State::Start(MatchOutcome::NoMatch) => State::AwaitingNoMatchDecision,
                State::AutoResolved(c) => State::Done(Resolution::Track {
                    record: c.record,
                    via: ResolvedVia::Automatic,
                }),
                State::AwaitingChoice(list) => {
                    State::Done(self.decide(query, &list, PromptKind::Ambiguous, source))
                }
                State::AwaitingNoMatchDecision => {
                    State::Done(self.decide(query, &[], PromptKind::NoMatch, source))
                }
                State::Done(resolution) => {
                    log_resolution(query, &resolution);
                    return resolution;
                }
            };
        }
    }

    fn decide(
        &self,
        query: &QueryLine,
        candidates: &[Candidate],
        kind: PromptKind,
        source: &mut dyn DecisionSource,
    ) -> Resolution {
        let pool = self.index.artist_pool(&query.normalized_artist);
        let prompt = Prompt {
            query,
            candidates,
            artist_pool_size: pool.len(),
            kind,
        };
        let choice = source.ask(&prompt);
        if !prompt.allows(choice) {
            tracing::warn!(line = query.line_no, ?choice, "invalid choice, skipping line");
            return skipped(query, SkipReason::InvalidChoice);
        }

        match choice {
            Choice::Select(i) => Resolution::Track {
                record: Arc::clone(&candidates[i].record),
                // A policy pick is not a user selection
                via: if source.is_interactive() {
                    ResolvedVia::Selected
                } else {
                    ResolvedVia::Automatic
                },
            },
            Choice::RandomByArtist => match pick_from(&pool, source) {
                Some(record) => Resolution::Track {
                    record,
                    via: ResolvedVia::RandomByArtist,
                },
                None => skipped(query, SkipReason::InvalidChoice),
            },
            Choice::Skip if kind == PromptKind::NoMatch => skipped(query, SkipReason::NoMatch),
            Choice::Skip => skipped(query, SkipReason::UserSkipped),
            Choice::Abort => skipped(query, SkipReason::Aborted),
        }
    }
}

fn pick_from(pool: &[Arc<TrackRecord>], source: &mut dyn DecisionSource) -> Option<Arc<TrackRecord>> {
    let i = source.pick_random(pool.len());
    pool.get(i).cloned()
}

fn skipped(query: &QueryLine, reason: SkipReason) -> Resolution {
    Resolution::Skipped {
        query: query.clone(),
        reason,
    }
}

fn log_resolution(query: &QueryLine, resolution: &Resolution) {
    match resolution {
        Resolution::Track { record, via } => tracing::info!(
            line = query.line_no,
            query = %query.raw_text,
            path = %record.path.display(),
            ?via,
            "resolved"
        ),
        Resolution::Skipped { reason, .. } => tracing::info!(
            line = query.line_no,
            query = %query.raw_text,
            ?reason,
            "skipped"
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::tests::record;
    use crate::models::RunStats;
    use std::collections::VecDeque;

    /// Replays scripted choices and records how often it was asked.
    pub(crate) struct Scripted {
        pub interactive: bool,
        pub choices: VecDeque<Choice>,
        pub random: usize,
        pub asked: usize,
        pub last_pool_size: Option<usize>,
    }

    impl Scripted {
        pub(crate) fn new(choices: &[Choice]) -> Self {
            Self {
                interactive: true,
                choices: choices.iter().copied().collect(),
                random: 0,
                asked: 0,
                last_pool_size: None,
            }
        }
    }

    impl DecisionSource for Scripted {
        fn is_interactive(&self) -> bool {
            self.interactive
        }

        fn ask(&mut self, prompt: &Prompt<'_>) -> Choice {
            self.asked += 1;
            self.last_pool_size = Some(prompt.artist_pool_size);
            self.choices.pop_front().unwrap_or(Choice::Skip)
        }

        fn pick_random(&mut self, _pool_len: usize) -> usize {
            self.random
        }
    }

    fn index() -> LibraryIndex {
        LibraryIndex::from_records(vec![
            record("/m/blur/song2.mp3", "Blur", "Song 2", "Blur", false),
            record("/m/blur/parklife.mp3", "Blur", "Parklife", "Parklife", false),
            record("/m/blur/tender.mp3", "Blur", "Tender", "13", false),
        ])
    }

    fn query(artist: &str, track: &str) -> QueryLine {
        QueryLine {
            line_no: 7,
            raw_text: format!("{} - {}", artist, track),
            artist: artist.into(),
            track: track.into(),
            wants_live: false,
            normalized_artist: artist.to_lowercase(),
            normalized_track: track.to_lowercase(),
        }
    }

    fn candidates(index: &LibraryIndex) -> Vec<Candidate> {
        index
            .records()
            .iter()
            .enumerate()
            .map(|(i, r)| Candidate {
                record: Arc::clone(r),
                base_score: 80.0,
                artist_score: 100.0,
                combined_score: 80.0,
                penalty_applied: false,
                title_distance: 0,
                order: i,
            })
            .collect()
    }

    fn path_of(resolution: &Resolution) -> String {
        resolution.record().unwrap().path.display().to_string()
    }

    #[test]
    fn resolved_needs_no_prompt() {
        let index = index();
        let mut source = Scripted::new(&[]);
        let c = candidates(&index).remove(1);
        let r = Resolver::new(&index).resolve(&query("blur", "parklife"), MatchOutcome::Resolved(c), &mut source);
        assert!(matches!(r, Resolution::Track { via: ResolvedVia::Automatic, .. }));
        assert_eq!(source.asked, 0);
    }

    #[test]
    fn non_interactive_no_match_skips_without_prompt() {
        let index = index();
        let mut source = Scripted::new(&[Choice::RandomByArtist]);
        source.interactive = false;
        let r = Resolver::new(&index).resolve(&query("blur", "girls and boys"), MatchOutcome::NoMatch, &mut source);
        assert!(matches!(r, Resolution::Skipped { reason: SkipReason::NonInteractive, .. }));
        assert_eq!(source.asked, 0);

        let r = Resolver::new(&index).resolve(&query("blur", "girls and boys"), MatchOutcome::NoMatch, &mut AutoAccept);
        assert!(matches!(r, Resolution::Skipped { reason: SkipReason::NonInteractive, .. }));
    }

    #[test]
    fn selection_picks_ranked_candidate() {
        let index = index();
        let list = candidates(&index);
        let expected = list[2].record.path.display().to_string();
        let mut source = Scripted::new(&[Choice::Select(2)]);
        let r = Resolver::new(&index).resolve(&query("blur", "song"), MatchOutcome::Ambiguous(list), &mut source);
        assert!(matches!(r, Resolution::Track { via: ResolvedVia::Selected, .. }));
        assert_eq!(path_of(&r), expected);
        assert_eq!(source.last_pool_size, Some(3));
    }

    #[test]
    fn out_of_range_selection_is_invalid() {
        let index = index();
        let mut source = Scripted::new(&[Choice::Select(9)]);
        let r = Resolver::new(&index).resolve(
            &query("blur", "song"),
            MatchOutcome::Ambiguous(candidates(&index)),
            &mut source,
        );
        assert!(matches!(r, Resolution::Skipped { reason: SkipReason::InvalidChoice, .. }));
    }

    #[test]
    fn select_is_invalid_for_no_match() {
        let index = index();
        let mut source = Scripted::new(&[Choice::Select(0)]);
        let r = Resolver::new(&index).resolve(&query("blur", "beetlebum"), MatchOutcome::NoMatch, &mut source);
        assert!(matches!(r, Resolution::Skipped { reason: SkipReason::InvalidChoice, .. }));
    }

    #[test]
    fn random_by_artist_uses_source_index() {
        let index = index();
        let mut source = Scripted::new(&[Choice::RandomByArtist]);
        source.random = 2;
        let r = Resolver::new(&index).resolve(&query("blur", "beetlebum"), MatchOutcome::NoMatch, &mut source);
        assert!(matches!(r, Resolution::Track { via: ResolvedVia::RandomByArtist, .. }));
        assert_eq!(path_of(&r), "/m/blur/tender.mp3");
    }

    #[test]
    fn random_with_empty_pool_is_invalid() {
        let index = index();
        let mut source = Scripted::new(&[Choice::RandomByArtist]);
        let r = Resolver::new(&index).resolve(&query("oasis", "wonderwall"), MatchOutcome::NoMatch, &mut source);
        assert!(matches!(r, Resolution::Skipped { reason: SkipReason::InvalidChoice, .. }));
        assert_eq!(source.last_pool_size, Some(0));
    }

    #[test]
    fn skip_and_abort() {
        let index = index();
        let mut source = Scripted::new(&[Choice::Skip, Choice::Abort]);
        let resolver = Resolver::new(&index);
        let r = resolver.resolve(&query("blur", "x"), MatchOutcome::Ambiguous(candidates(&index)), &mut source);
        assert!(matches!(r, Resolution::Skipped { reason: SkipReason::UserSkipped, .. }));
        let r = resolver.resolve(&query("blur", "x"), MatchOutcome::NoMatch, &mut source);
        assert!(r.is_aborted());
    }

    #[test]
    fn skip_on_no_match_reports_no_match() {
        let index = index();
        let mut source = Scripted::new(&[Choice::Skip]);
        let r = Resolver::new(&index).resolve(&query("blur", "beetlebum"), MatchOutcome::NoMatch, &mut source);
        assert!(matches!(r, Resolution::Skipped { reason: SkipReason::NoMatch, .. }));
        assert_eq!(source.asked, 1);

        let mut stats = RunStats::default();
        stats.record(&r);
        assert_eq!(stats.no_match, 1);
        assert_eq!(stats.user_skipped, 0);
    }

    #[test]
    fn auto_accept_takes_top_candidate() {
        let index = index();
        let list = candidates(&index);
        let top = list[0].record.path.clone();
        let r = Resolver::new(&index).resolve(&query("blur", "song"), MatchOutcome::Ambiguous(list), &mut AutoAccept);
        assert!(matches!(r, Resolution::Track { via: ResolvedVia::Automatic, .. }));
        assert_eq!(r.record().unwrap().path, top);

        let mut stats = RunStats::default();
        stats.record(&r);
        assert_eq!(stats.auto_resolved, 1);
        assert_eq!(stats.selected, 0);
    }
}
