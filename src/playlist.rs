//! Playlist input parsing and output writing: "Artist - Track" text in, M3U
//! and a missing-tracks report out.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::InputError;
use crate::models::{QueryLine, Resolution, ResolvedLine, TrackRecord};
use crate::normalize::{Normalizer, Role};

// ============================================================================
// Input
// ============================================================================

pub const SEPARATOR: &str = " - ";

/// Stands in for an escaped hyphen while the separator is located.
const ESCAPED_HYPHEN: char = '\u{0}';

fn unescape(s: &str) -> String {
    s.replace(ESCAPED_HYPHEN, "-").trim().to_string()
}

/// Split one line into (artist, track) on the first unescaped " - ".
/// `\-` is a literal hyphen that never separates.
pub fn split_line(line_no: usize, line: &str) -> Result<(String, String), InputError> {
    let masked = line.trim().replace(r"\-", &ESCAPED_HYPHEN.to_string());
    let (artist, track) = match masked.split_once(SEPARATOR) {
        Some(parts) => parts,
        None if masked.ends_with(" -") || masked.starts_with("- ") || masked == "-" => {
            return Err(InputError::EmptyField {
                line_no,
                line: line.trim().to_string(),
            })
        }
        None => {
            return Err(InputError::MissingSeparator {
                line_no,
                line: line.trim().to_string(),
            })
        }
    };

    let (artist, track) = (unescape(artist), unescape(track));
    if artist.is_empty() || track.is_empty() {
        return Err(InputError::EmptyField {
            line_no,
            line: line.trim().to_string(),
        });
    }
    Ok((artist, track))
}

/// Parse playlist text. Blank lines and `#` comments are ignored; malformed
/// lines are returned as errors and do not stop parsing. Line numbers are 1-based.
pub fn parse_playlist(text: &str, normalizer: &Normalizer) -> (Vec<QueryLine>, Vec<InputError>) {
    let mut queries = Vec::new();
    let mut errors = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match split_line(line_no, trimmed) {
            Ok((artist, track)) => {
                let t = normalizer.normalize(&track, Role::Title);
                queries.push(QueryLine {
                    line_no,
                    raw_text: trimmed.to_string(),
                    normalized_artist: normalizer.normalize_text(&artist, Role::Artist),
                    normalized_track: t.text,
                    wants_live: t.had_live_marker,
                    artist,
                    track,
                });
            }
            Err(e) => {
                tracing::warn!("{}", e);
                errors.push(e);
            }
        }
    }

    (queries, errors)
}

pub fn read_playlist(path: &Path, normalizer: &Normalizer) -> Result<(Vec<QueryLine>, Vec<InputError>)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read playlist file {}", path.display()))?;
    Ok(parse_playlist(&text, normalizer))
}

// ============================================================================
// Output Names
// ============================================================================

/// `{basename}` or `{basename:<transforms>}`
static BASENAME_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{basename:?([culps_]*)\}").unwrap());

/// Characters not allowed in a file name on common filesystems
static INVALID_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1F\x7F]"#).unwrap());

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").unwrap());
static PRETTIFY_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.\s]+").unwrap());
static HYPHEN_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_.-]+").unwrap());
static UNDERSCORE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s.-]+|_+").unwrap());
static REPEATED_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").unwrap());

const DATE_PLACEHOLDERS: &[(&str, &str)] = &[
    ("{YYYY}", "%Y"),
    ("{YY}", "%y"),
    ("{MM}", "%m"),
    ("{DD}", "%d"),
    ("{hh}", "%H"),
    ("{mm}", "%M"),
    ("{ss}", "%S"),
];

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Apply basename transforms: one separator style (`p` spaces, `s` hyphens,
/// `_` underscores, in that priority) then one case style (`c` capitalized
/// words, `u` upper, `l` lower).
fn transform_basename(basename: &str, codes: &str) -> String {
    let mut name = if codes.contains('p') {
        PRETTIFY_SEPARATORS.replace_all(basename, " ").trim().to_string()
    } else if codes.contains('s') {
        HYPHEN_SEPARATORS.replace_all(basename, "-").trim_matches('-').to_string()
    } else if codes.contains('_') {
        UNDERSCORE_SEPARATORS.replace_all(basename, "_").trim_matches('_').to_string()
    } else {
        basename.to_string()
    };

    if codes.contains('c') {
        name = name.split(' ').filter(|w| !w.is_empty()).map(capitalize).collect::<Vec<_>>().join(" ");
    } else if codes.contains('u') {
        name = name.to_uppercase();
    } else if codes.contains('l') {
        name = name.to_lowercase();
    }
    name
}

/// Split off the extension of the last path component, ignoring leading dots.
fn split_extension(name: &str) -> (&str, &str) {
    let base_start = name.rfind(|c: char| c == '/' || c == '\\').map_or(0, |i| i + 1);
    let base = &name[base_start..];
    match base.rfind('.') {
        Some(i) if base[..i].chars().any(|c| c != '.') => name.split_at(base_start + i),
        _ => (name, ""),
    }
}

fn fallback_output_name(basename: &str, now: &NaiveDateTime) -> String {
    let base = NON_ALNUM.replace_all(basename, "_");
    let base = base.trim_matches('_');
    let date = now.format("%Y-%m-%d");
    if base.is_empty() {
        format!("playlist_{}.m3u", date)
    } else {
        format!("{}_{}.m3u", base, date)
    }
}

/// Expand an output name template.
///
/// Placeholders: `{basename}` or `{basename:<transforms>}` plus `{YYYY}`,
/// `{YY}`, `{MM}`, `{DD}`, `{hh}`, `{mm}`, `{ss}` from `now`. The result is a
/// single file name: filesystem-hostile characters become `_` and `.m3u` is
/// added when the template has no extension. A template that leaves nothing
/// usable falls back to `<basename>_<YYYY-MM-DD>.m3u`.
pub fn format_output_name(template: &str, basename: &str, now: &NaiveDateTime) -> String {
    let mut name = BASENAME_PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| transform_basename(basename, &caps[1]))
        .into_owned();
    for (placeholder, pattern) in DATE_PLACEHOLDERS {
        if name.contains(placeholder) {
            name = name.replace(placeholder, &now.format(pattern).to_string());
        }
    }

    let (stem, extension) = split_extension(&name);
    let extension = match extension.trim() {
        "" | "." => ".m3u",
        _ => extension,
    };
    let stem = INVALID_FILENAME_CHARS.replace_all(stem, "_");
    let stem = REPEATED_UNDERSCORES.replace_all(&stem, "_");
    let stem = stem.trim_matches(|c: char| c == '_' || c == '.' || c == ' ');

    if stem.is_empty() {
        tracing::warn!(template, basename, "output name template produced an empty name, using the default");
        return fallback_output_name(basename, now);
    }
    format!("{}{}", stem, extension)
}

/// `<dir>/<expanded template>` with the input's stem as basename, where `dir`
/// defaults to the input's directory.
pub fn default_output_path(
    input: &Path,
    output_dir: Option<&Path>,
    name_template: &str,
    now: &NaiveDateTime,
) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "playlist".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format_output_name(name_template, &stem, now))
}

// ============================================================================
// Output
// ============================================================================

fn entry_path(record: &TrackRecord, music_dir: Option<&Path>) -> String {
    let path = music_dir
        .and_then(|base| record.path.strip_prefix(base).ok())
        .unwrap_or(&record.path);
    path.to_string_lossy().into_owned()
}

/// Render an extended M3U for `records`, in order.
pub fn render_m3u(records: &[&TrackRecord], music_dir: Option<&Path>) -> String {
    let mut out = String::from("#EXTM3U\n");
    for r in records {
        let secs = r.duration.map_or(-1, i64::from);
        let _ = writeln!(out, "#EXTINF:{},{}", secs, r.display_name());
        let _ = writeln!(out, "{}", entry_path(r, music_dir));
    }
    out
}

/// Write the resolved tracks of `lines` to `path`. Returns the entry count.
pub fn write_m3u(path: &Path, lines: &[ResolvedLine], music_dir: Option<&Path>) -> Result<usize> {
    let records: Vec<&TrackRecord> = lines
        .iter()
        .filter_map(|l| l.resolution.record().map(|r| r.as_ref()))
        .collect();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    fs::write(path, render_m3u(&records, music_dir))
        .with_context(|| format!("Failed to write playlist {}", path.display()))?;
    tracing::info!(path = %path.display(), entries = records.len(), "wrote playlist");
    Ok(records.len())
}

/// `<m3u stem>-missing-tracks.txt`
pub fn missing_report_name(m3u_path: &Path) -> String {
    let stem = m3u_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "playlist".to_string());
    format!("{}-missing-tracks.txt", stem)
}

/// Write one "Artist - Track (Reason: ...)" line per skipped input into `dir`.
/// Nothing is written when every line resolved.
pub fn write_missing_report(
    dir: &Path,
    m3u_path: &Path,
    source: &Path,
    lines: &[ResolvedLine],
) -> Result<Option<PathBuf>> {
    let skipped: Vec<_> = lines
        .iter()
        .filter_map(|l| match &l.resolution {
            Resolution::Skipped { query, reason } => Some((query, reason)),
            Resolution::Track { .. } => None,
        })
        .collect();
    if skipped.is_empty() {
        return Ok(None);
    }

    let mut out = String::new();
    let _ = writeln!(out, "# Missing tracks for playlist: {}", m3u_path.display());
    let _ = writeln!(out, "# Source: {}", source.display());
    let _ = writeln!(out, "# {} of {} tracks not added", skipped.len(), lines.len());
    out.push('\n');
    for (query, reason) in &skipped {
        let _ = writeln!(
            out,
            "{} - {} (Reason: {})",
            query.artist,
            query.track,
            reason.describe()
        );
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create missing-tracks directory {}", dir.display()))?;
    let path = dir.join(missing_report_name(m3u_path));
    fs::write(&path, out)
        .with_context(|| format!("Failed to write missing-tracks report {}", path.display()))?;
    tracing::info!(path = %path.display(), missing = skipped.len(), "wrote missing-tracks report");
    Ok(Some(path))
}

/// Copy the finished playlist into MPD's playlist directory.
pub fn copy_to_playlist_dir(m3u_path: &Path, playlist_dir: &Path) -> Result<PathBuf> {
    let name = m3u_path
        .file_name()
        .with_context(|| format!("Playlist path has no file name: {}", m3u_path.display()))?;
    fs::create_dir_all(playlist_dir)
        .with_context(|| format!("Failed to create MPD playlist directory {}", playlist_dir.display()))?;
    let target = playlist_dir.join(name);
    fs::copy(m3u_path, &target).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            m3u_path.display(),
            target.display()
        )
    })?;
    tracing::info!(path = %target.display(), "copied playlist to MPD directory");
    Ok(target)
}
