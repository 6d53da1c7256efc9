//! Interactive decision source over any reader/writer pair (stdin/stdout in
//! the binary, in-memory buffers in tests).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, BufRead, Write};

use crate::models::Candidate;
use crate::resolver::{Choice, DecisionSource, Prompt, PromptKind};

/// Rows shown per prompt; the rest are summarized.
pub const MAX_SHOWN: usize = 7;

pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
    rng: StdRng,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio(seed: Option<u64>) -> Self {
        Self::new(io::stdin().lock(), io::stdout(), seed)
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { input, output, rng }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn render(&mut self, prompt: &Prompt<'_>) -> io::Result<()> {
        let q = prompt.query;
        let wanted = if q.wants_live { "live" } else { "studio" };
        writeln!(self.output)?;
        writeln!(
            self.output,
            "Line {}: {} - {} ({} version requested)",
            q.line_no, q.artist, q.track, wanted
        )?;

        match prompt.kind {
            PromptKind::NoMatch => writeln!(self.output, "  No match found in library.")?,
            PromptKind::Ambiguous => {
                writeln!(self.output, "  Several tracks match:")?;
                for (i, c) in prompt.candidates.iter().take(MAX_SHOWN).enumerate() {
                    writeln!(self.output, "  {:>2}. {}", i + 1, describe(c, q.wants_live))?;
                }
                if prompt.candidates.len() > MAX_SHOWN {
                    writeln!(
                        self.output,
                        "      ... and {} more",
                        prompt.candidates.len() - MAX_SHOWN
                    )?;
                }
                let lives = prompt.candidates.iter().filter(|c| c.record.is_live).count();
                if lives == prompt.candidates.len() && !q.wants_live {
                    writeln!(self.output, "  Note: only live versions matched.")?;
                } else if lives == 0 && q.wants_live {
                    writeln!(self.output, "  Note: only studio versions matched.")?;
                }
            }
        }

        let mut options = Vec::new();
        if prompt.kind == PromptKind::Ambiguous {
            options.push(format!("[1-{}] select", shown(prompt)));
        }
        options.push("(s)kip".to_string());
        if prompt.artist_pool_size > 0 {
            options.push(format!(
                "(r)andom track by {} ({} available)",
                q.artist, prompt.artist_pool_size
            ));
        }
        options.push("(q)uit".to_string());
        write!(self.output, "Choose {}: ", options.join(", "))?;
        self.output.flush()
    }

    fn parse(&self, answer: &str, prompt: &Prompt<'_>) -> Option<Choice> {
        let choice = match answer.trim().to_ascii_lowercase().as_str() {
            "s" | "skip" => Choice::Skip,
            "r" | "random" => Choice::RandomByArtist,
            "q" | "quit" => Choice::Abort,
            other => {
                let n: usize = other.parse().ok()?;
                if n == 0 || n > shown(prompt) {
                    return None;
                }
                Choice::Select(n - 1)
            }
        };
        prompt.allows(choice).then_some(choice)
    }
}

fn shown(prompt: &Prompt<'_>) -> usize {
    prompt.candidates.len().min(MAX_SHOWN)
}

fn format_secs(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn describe(c: &Candidate, wants_live: bool) -> String {
    let r = &c.record;
    let mut line = r.display_name();
    if !r.album.is_empty() {
        line.push_str(&format!(" | {}", r.album));
    }
    if let Some(d) = r.duration {
        line.push_str(&format!(" | {}", format_secs(d)));
    }
    line.push_str(&format!(
        " | score {} | {}",
        c.rounded(),
        if r.is_live { "LIVE" } else { "Studio" }
    ));
    if r.is_live != wants_live {
        line.push_str(if c.penalty_applied {
            " (live/studio mismatch, penalized)"
        } else {
            " (live/studio mismatch)"
        });
    }
    line
}

impl<R: BufRead, W: Write> DecisionSource for TerminalPrompt<R, W> {
    fn is_interactive(&self) -> bool {
        true
    }

    fn ask(&mut self, prompt: &Prompt<'_>) -> Choice {
        loop {
            if let Err(e) = self.render(prompt) {
                tracing::warn!(error = %e, "cannot write prompt, skipping line");
                return Choice::Skip;
            }
            let mut answer = String::new();
            match self.input.read_line(&mut answer) {
                Ok(0) => return Choice::Skip,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "cannot read answer, skipping line");
                    return Choice::Skip;
                }
            }
            match self.parse(&answer, prompt) {
                Some(choice) => return choice,
                None => {
                    let _ = writeln!(self.output, "Invalid choice '{}'.", answer.trim());
                }
            }
        }
    }

    fn pick_random(&mut self, pool_len: usize) -> usize {
        self.rng.gen_range(0..pool_len.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::record;
    use crate::models::QueryLine;
    use std::io::Cursor;
    use std::sync::Arc;

    fn query(wants_live: bool) -> QueryLine {
        QueryLine {
            line_no: 3,
            raw_text: "Nirvana - Lithium".into(),
            artist: "Nirvana".into(),
            track: "Lithium".into(),
            wants_live,
            normalized_artist: "nirvana".into(),
            normalized_track: "lithium".into(),
        }
    }

    fn candidates(n: usize, live: bool) -> Vec<Candidate> {
        (0..n)
            .map(|i| Candidate {
                record: Arc::new(record(&format!("/m/{}.mp3", i), "Nirvana", "Lithium", "Nevermind", live)),
                base_score: 90.0,
                artist_score: 100.0,
                combined_score: 90.0 - i as f64,
                penalty_applied: live,
                title_distance: 0,
                order: i,
            })
            .collect()
    }

    fn run(input: &str, prompt: &Prompt<'_>) -> (Choice, String) {
        let mut tp = TerminalPrompt::new(Cursor::new(input.as_bytes().to_vec()), Vec::new(), Some(1));
        let choice = tp.ask(prompt);
        (choice, String::from_utf8(tp.into_output()).unwrap())
    }

    #[test]
    fn number_selects_zero_based() {
        let q = query(false);
        let list = candidates(3, false);
        let prompt = Prompt { query: &q, candidates: &list, artist_pool_size: 3, kind: PromptKind::Ambiguous };
        let (choice, out) = run("2\n", &prompt);
        assert_eq!(choice, Choice::Select(1));
        assert!(out.contains(" 1. Nirvana - Lithium | Nevermind | 3:20 | score 90 | Studio"));
        assert!(out.contains("(r)andom track by Nirvana (3 available)"));
    }

    #[test]
    fn invalid_input_reprompts() {
        let q = query(false);
        let list = candidates(2, false);
        let prompt = Prompt { query: &q, candidates: &list, artist_pool_size: 0, kind: PromptKind::Ambiguous };
        let (choice, out) = run("9\nr\nx\ns\n", &prompt);
        assert_eq!(choice, Choice::Skip);
        assert_eq!(out.matches("Invalid choice").count(), 3);
        assert!(!out.contains("(r)andom"));
    }

    #[test]
    fn eof_means_skip() {
        let q = query(false);
        let prompt = Prompt { query: &q, candidates: &[], artist_pool_size: 5, kind: PromptKind::NoMatch };
        let (choice, out) = run("", &prompt);
        assert_eq!(choice, Choice::Skip);
        assert!(out.contains("No match found"));
    }

    #[test]
    fn no_match_accepts_random_and_quit() {
        let q = query(false);
        let prompt = Prompt { query: &q, candidates: &[], artist_pool_size: 5, kind: PromptKind::NoMatch };
        assert_eq!(run("R\n", &prompt).0, Choice::RandomByArtist);
        assert_eq!(run("q\n", &prompt).0, Choice::Abort);
        let (choice, _) = run("1\ns\n", &prompt);
        assert_eq!(choice, Choice::Skip);
    }

    #[test]
    fn long_lists_are_truncated_with_mismatch_notes() {
        let q = query(false);
        let list = candidates(9, true);
        let prompt = Prompt { query: &q, candidates: &list, artist_pool_size: 9, kind: PromptKind::Ambiguous };
        let (choice, out) = run("8\n7\n", &prompt);
        assert_eq!(choice, Choice::Select(6));
        assert!(out.contains("... and 2 more"));
        assert!(out.contains("LIVE (live/studio mismatch, penalized)"));
        assert!(out.contains("only live versions matched"));
        assert!(!out.contains(" 8. "));
    }

    #[test]
    fn seeded_random_is_in_range_and_repeatable() {
        let mut a = TerminalPrompt::new(Cursor::new(Vec::new()), Vec::new(), Some(42));
        let mut b = TerminalPrompt::new(Cursor::new(Vec::new()), Vec::new(), Some(42));
        for _ in 0..20 {
            let x = a.pick_random(5);
            assert!(x < 5);
            assert_eq!(x, b.pick_random(5));
        }
    }
}
