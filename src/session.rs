//! Sequential driver: match and resolve every query line in input order.

use indicatif::ProgressBar;
use std::time::Instant;

use crate::library::LibraryIndex;
use crate::matcher::Matcher;
use crate::models::{QueryLine, Resolution, ResolvedLine, RunStats, SkipReason};
use crate::progress::{create_progress_bar, log_progress};
use crate::resolver::{DecisionSource, Resolver};

/// Everything a run produced, lines in input order.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub lines: Vec<ResolvedLine>,
    pub stats: RunStats,
}

impl SessionReport {
    pub fn resolved(&self) -> impl Iterator<Item = &ResolvedLine> {
        self.lines
            .iter()
            .filter(|l| matches!(l.resolution, Resolution::Track { .. }))
    }
}

pub struct Session<'a> {
    index: &'a LibraryIndex,
    matcher: &'a Matcher,
}

impl<'a> Session<'a> {
    pub fn new(index: &'a LibraryIndex, matcher: &'a Matcher) -> Self {
        Self { index, matcher }
    }

    /// Resolve `queries` one by one. An abort stops the run; the aborting line
    /// and every later line come back as `Skipped(Aborted)`.
    pub fn run(&self, queries: Vec<QueryLine>, source: &mut dyn DecisionSource) -> SessionReport {
        let start = Instant::now();
        let resolver = Resolver::new(self.index);
        let total = queries.len() as u64;
        // Bars would garble interactive prompts
        let pb = if source.is_interactive() {
            ProgressBar::hidden()
        } else {
            create_progress_bar(total, "Matching")
        };

        let mut stats = RunStats {
            input_lines: queries.len(),
            ..Default::default()
        };
        let mut lines = Vec::with_capacity(queries.len());
        let mut queries = queries.into_iter();

        for query in queries.by_ref() {
            let outcome = self.matcher.match_query(&query, self.index);
            let resolution = resolver.resolve(&query, outcome, source);
            stats.record(&resolution);
            let aborted = resolution.is_aborted();
            lines.push(ResolvedLine { query, resolution });
            pb.inc(1);
            log_progress("Matching", pb.position(), total, 50);
            if aborted {
                break;
            }
        }

        for query in queries {
            stats.unprocessed += 1;
            lines.push(ResolvedLine {
                resolution: Resolution::Skipped {
                    query: query.clone(),
                    reason: SkipReason::Aborted,
                },
                query,
            });
        }
        if stats.aborted {
            tracing::warn!(unprocessed = stats.unprocessed, "run aborted by user");
        }

        pb.finish_with_message(format!("Matched {} of {} lines", stats.resolved(), total));
        stats.elapsed_seconds = start.elapsed().as_secs_f64();
        SessionReport { lines, stats }
    }
}
