//! String normalization for library/query matching.
//!
//! Normalized strings are only ever compared, never displayed. Both the
//! library index and the query parser go through [`Normalizer::normalize`],
//! so any change here shifts every score. Run the tests after changes.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

use crate::error::ConfigError;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Bracketed live markers: "(Live)", "[Live at Wembley]", "(MTV Unplugged)", "(In Concert)"
pub static LIVE_BRACKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*[\(\[][^\)\]]*\b(?:live|unplugged|concert)\b[^\)\]]*[\)\]]").unwrap()
});

/// Dash live suffix: "Song - Live", "Song - Live at Budokan", "Song - Unplugged", "Song - Concert Version"
pub static LIVE_DASH_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[-–—]\s+(?:live|unplugged|concert)\b.*$").unwrap());

/// Conjunction variants collapsed to " and ": "&", "/", "+", "and"
pub static CONJUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[&/+]\s*|\s+and\s+").unwrap());

/// Track number prefixes: "03 - ", "1. ", "07_", "12) ", "04 " (zero-padded only without separator).
/// Repeated so "01 - 03 - Song" is fully stripped.
pub static TRACK_NUMBER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{1,3}\s*[-–—._)]\s*|0\d\s+)+").unwrap());

/// Any bracketed segment, capturing its inner text
pub static BRACKET_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\(\[]([^\)\]]*)[\)\]]").unwrap());

/// Inner text of a feature-artist segment: "feat. X", "ft X", "featuring X", "with X"
pub static FEATURE_INNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:feat\.?|ft\.?|featuring|with)(?:\s|$)").unwrap());

/// Unbracketed trailing feature credit: "Song feat. X", "Artist ft. Y"
pub static FEATURE_TRAILING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+(?:feat\.?|ft\.?|featuring)\s+.*$").unwrap());

/// Dash suffix: "Song - Radio Edit" (captures the suffix text)
pub static DASH_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+[-–—]\s+(.+)$").unwrap());

/// Leading articles ("the the" collapses too)
pub static LEADING_ARTICLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:the\s+)+").unwrap());

/// Everything that is not a lowercase ASCII letter, digit or whitespace
pub static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());

/// Regex to collapse runs of whitespace into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// TYPES
// ============================================================================

/// What a string is, which decides the role-specific steps applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Artist,
    Title,
    /// File stem, used to match untagged files.
    Filename,
    Album,
}

impl Role {
    fn strips_track_number(self) -> bool {
        matches!(self, Role::Title | Role::Filename)
    }

    fn strips_article(self) -> bool {
        !matches!(self, Role::Album)
    }

    fn strips_trailing_feature(self) -> bool {
        matches!(self, Role::Title | Role::Artist)
    }
}

/// Output of [`Normalizer::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedString {
    pub text: String,
    /// A live/unplugged/concert marker was found and removed.
    pub had_live_marker: bool,
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII: NFKD decomposition, combining marks
/// dropped, remaining non-ASCII transliterated.
/// e.g., "Beyoncé" → "beyonce", "Motörhead" → "motorhead"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

fn collapse_whitespace(s: &str) -> String {
    MULTI_SPACE.replace_all(s, " ").trim().to_string()
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Normalizer configured with the parenthetical strip keywords.
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Matches any strip keyword as a whole word, longest keyword first.
    strip_keywords: Option<Regex>,
}

impl Normalizer {
    /// Build a normalizer. Keywords are literal tokens, matched case-insensitively
    /// on word boundaries ("edit" does not touch "edited").
    pub fn new<S: AsRef<str>>(strip_keywords: &[S]) -> Result<Self, ConfigError> {
        let mut keywords: Vec<String> = Vec::with_capacity(strip_keywords.len());
        for kw in strip_keywords {
            let folded = collapse_whitespace(&fold_to_ascii(kw.as_ref()));
            if folded.is_empty() {
                return Err(ConfigError::InvalidStripKeyword(kw.as_ref().to_string()));
            }
            keywords.push(folded);
        }
        keywords.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        keywords.dedup();

        let strip_keywords = if keywords.is_empty() {
            None
        } else {
            let alternation = keywords
                .iter()
                .map(|k| regex::escape(k).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            let re = Regex::new(&format!(r"\b(?:{})\b", alternation))
                .map_err(|_| ConfigError::InvalidStripKeyword(keywords.join(", ")))?;
            Some(re)
        };

        Ok(Self { strip_keywords })
    }

    /// Normalize `text` for comparison. Never fails: if cleaning leaves nothing,
    /// the lower-cased trimmed original comes back with no live marker.
    pub fn normalize(&self, text: &str, role: Role) -> NormalizedString {
        let original = text.trim();
        if original.is_empty() {
            return NormalizedString::default();
        }

        // Accent folding + lower-casing
        let mut s = fold_to_ascii(original);

        // Live markers
        let mut had_live_marker = false;
        if LIVE_BRACKET.is_match(&s) {
            had_live_marker = true;
            s = LIVE_BRACKET.replace_all(&s, " ").to_string();
        }
        if LIVE_DASH_SUFFIX.is_match(&s) {
            had_live_marker = true;
            s = LIVE_DASH_SUFFIX.replace(&s, "").to_string();
        }

        s = CONJUNCTION.replace_all(&s, " and ").to_string();

        if role.strips_track_number() {
            s = TRACK_NUMBER_PREFIX.replace(s.trim_start(), "").to_string();
        }

        s = BRACKET_SEGMENT
            .replace_all(&s, |caps: &Captures| self.process_bracket(&caps[1]))
            .to_string();
        s = self.process_dash_suffix(&s);
        if role.strips_trailing_feature() {
            s = FEATURE_TRAILING.replace(&s, "").to_string();
        }

        s = NON_WORD.replace_all(&s, "").to_string();
        s = collapse_whitespace(&s);
        s = Self::strip_prefixes(s, role);

        if s.is_empty() {
            return NormalizedString {
                text: original.to_lowercase(),
                had_live_marker: false,
            };
        }

        NormalizedString {
            text: s,
            had_live_marker,
        }
    }

    /// Convenience wrapper returning only the normalized text.
    pub fn normalize_text(&self, text: &str, role: Role) -> String {
        self.normalize(text, role).text
    }

    /// Feature credits vanish; strip keywords are removed token-wise; anything
    /// else keeps its content without the brackets.
    fn process_bracket(&self, inner: &str) -> String {
        if FEATURE_INNER.is_match(inner) {
            return " ".to_string();
        }
        format!(" {} ", self.remove_keywords(inner))
    }

    fn process_dash_suffix(&self, s: &str) -> String {
        let Some(re) = &self.strip_keywords else {
            return s.to_string();
        };
        match DASH_SUFFIX.captures(s) {
            Some(caps) if re.is_match(&caps[1]) => {
                let whole = caps.get(0).map_or(0, |m| m.start());
                format!("{} {}", &s[..whole], self.remove_keywords(&caps[1]))
            }
            _ => s.to_string(),
        }
    }

    fn remove_keywords(&self, s: &str) -> String {
        match &self.strip_keywords {
            Some(re) => re.replace_all(s, " ").to_string(),
            None => s.to_string(),
        }
    }

    /// Strip track numbers, articles and trailing credits until nothing changes,
    /// so that normalizing twice gives the same result.
    fn strip_prefixes(mut s: String, role: Role) -> String {
        loop {
            let before = s.len();
            if role.strips_track_number() {
                s = TRACK_NUMBER_PREFIX.replace(&s, "").to_string();
            }
            if role.strips_trailing_feature() {
                s = FEATURE_TRAILING.replace(&s, "").to_string();
            }
            if role.strips_article() {
                // Keep a lone "the" ("The The" → "the")
                let stripped = LEADING_ARTICLE.replace(&s, "");
                if !stripped.trim().is_empty() {
                    s = stripped.to_string();
                }
            }
            s = s.trim().to_string();
            if s.len() == before {
                return s;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(&[
            "remix",
            "radio edit",
            "edit",
            "version",
            "mix",
            "acoustic",
            "mono",
            "stereo",
            "reprise",
            "instrumental",
        ])
        .unwrap()
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Björk"), "bjork");
        assert_eq!(fold_to_ascii("Motörhead"), "motorhead");
        assert_eq!(fold_to_ascii("Beyoncé"), "beyonce");
    }

    #[test]
    fn test_normalize_title_basic() {
        let n = normalizer();
        assert_eq!(n.normalize_text("03 - Song Name", Role::Title), "song name");
        assert_eq!(n.normalize_text("1. Song Name", Role::Title), "song name");
        assert_eq!(n.normalize_text("  Café   del   Mar ", Role::Title), "cafe del mar");
        assert_eq!(n.normalize_text("Don't Stop", Role::Title), "dont stop");
    }

    #[test]
    fn test_track_number_keeps_numeric_titles() {
        let n = normalizer();
        assert_eq!(n.normalize_text("1979", Role::Title), "1979");
        assert_eq!(n.normalize_text("99 Luftballons", Role::Title), "99 luftballons");
        assert_eq!(n.normalize_text("07 Luftballons", Role::Title), "luftballons");
    }

    #[test]
    fn test_conjunctions_collapse() {
        let n = normalizer();
        assert_eq!(n.normalize_text("Simon & Garfunkel", Role::Artist), "simon and garfunkel");
        assert_eq!(n.normalize_text("Simon and Garfunkel", Role::Artist), "simon and garfunkel");
        assert_eq!(n.normalize_text("AC/DC", Role::Artist), "ac and dc");
    }

    #[test]
    fn test_feature_segments_removed() {
        let n = normalizer();
        assert_eq!(n.normalize_text("Song (feat. Someone)", Role::Title), "song");
        assert_eq!(n.normalize_text("Song [ft. Someone Else]", Role::Title), "song");
        assert_eq!(n.normalize_text("Song feat. Someone", Role::Title), "song");
        assert_eq!(n.normalize_text("Artist feat. Other", Role::Artist), "artist");
    }

    #[test]
    fn test_strip_keywords_keep_rest_of_parenthetical() {
        let n = normalizer();
        assert_eq!(n.normalize_text("Song (Radio Edit)", Role::Title), "song");
        assert_eq!(n.normalize_text("Song (Mark Ronson Remix)", Role::Title), "song mark ronson");
        assert_eq!(n.normalize_text("Song - Radio Edit", Role::Title), "song");
        assert_eq!(n.normalize_text("Song (Part 2)", Role::Title), "song part 2");
    }

    #[test]
    fn test_live_marker_detected_and_removed() {
        let n = normalizer();
        let out = n.normalize("Let It Be (Live)", Role::Title);
        assert_eq!(out.text, "let it be");
        assert!(out.had_live_marker);

        let out = n.normalize("Song [Live at Wembley 1986]", Role::Title);
        assert_eq!(out.text, "song");
        assert!(out.had_live_marker);

        let out = n.normalize("Song - Live", Role::Title);
        assert_eq!(out.text, "song");
        assert!(out.had_live_marker);

        let out = n.normalize("Song - Concert at the Forum", Role::Title);
        assert_eq!(out.text, "song");
        assert!(out.had_live_marker);

        let out = n.normalize("Live Forever", Role::Title);
        assert_eq!(out.text, "live forever");
        assert!(!out.had_live_marker);
    }

    #[test]
    fn test_articles_stripped() {
        let n = normalizer();
        assert_eq!(n.normalize_text("The Beatles", Role::Artist), "beatles");
        assert_eq!(n.normalize_text("The The", Role::Artist), "the");
        assert_eq!(n.normalize_text("The Live Album", Role::Album), "the live album");
    }

    #[test]
    fn test_empty_result_falls_back_to_original() {
        let n = normalizer();
        let out = n.normalize("!!!", Role::Artist);
        assert_eq!(out.text, "!!!");
        assert!(!out.had_live_marker);

        let out = n.normalize("(Live)", Role::Title);
        assert_eq!(out.text, "(live)");
        assert!(!out.had_live_marker);

        assert_eq!(n.normalize("   ", Role::Title), NormalizedString::default());
    }

    #[test]
    fn test_filename_role() {
        let n = normalizer();
        assert_eq!(
            n.normalize_text("01 - The Beatles - Let It Be", Role::Filename),
            "beatles let it be"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = normalizer();
        let inputs = [
            "03 - Song Name (feat. X)",
            "(01) The Song",
            "The the the Band",
            "Song, ft, Y",
            "Ünïcödé & Friends / Others",
            "Song (Mark Ronson Remix) - Radio Edit",
            "Let It Be (Live)",
            "!!!",
            "(Live)",
            "12. 04 - Title",
        ];
        for role in [Role::Artist, Role::Title, Role::Filename, Role::Album] {
            for input in inputs {
                let once = n.normalize_text(input, role);
                let twice = n.normalize_text(&once, role);
                assert_eq!(once, twice, "not idempotent for {:?} {:?}", role, input);
            }
        }
    }

    #[test]
    fn test_keyword_must_not_be_blank() {
        assert!(Normalizer::new(&["remix", "  "]).is_err());
        assert!(Normalizer::new::<&str>(&[]).is_ok());
    }
}
