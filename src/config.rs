//! Settings file, defaults and validation.
//!
//! `Settings` mirrors the TOML file; every field has a default so a missing
//! file or a partial file works. `Settings::match_config` validates the
//! matching section and compiles its patterns into a [`MatchConfig`], the
//! only configuration object the matching engine sees.

use regex::RegexSet;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::normalize::Normalizer;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_THRESHOLD: i64 = 75;
pub const DEFAULT_LIVE_PENALTY: f64 = 0.75;
pub const DEFAULT_MARGIN: i64 = 5;
pub const DEFAULT_MAX_CANDIDATES: usize = 10;
pub const DEFAULT_ARTIST_GATE: i64 = 60;
pub const DEFAULT_TITLE_WEIGHT: f64 = 0.8;

pub const DEFAULT_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "m4a"];

pub const DEFAULT_LIVE_ALBUM_KEYWORDS: &[&str] = &[
    r"\blive\b",
    r"\bunplugged\b",
    r"\bconcert\b",
    r"live at",
    r"live in",
    r"live from",
    r"official bootleg",
    r"acoustic sessions",
    r"peel session[s]?",
    r"radio session[s]?",
    r"mtv unplugged",
];

pub const DEFAULT_STRIP_KEYWORDS: &[&str] = &[
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
];

/// Output file name template, see `playlist::format_output_name`.
pub const DEFAULT_OUTPUT_NAME_FORMAT: &str = "{basename:cp}_{YYYY}-{MM}-{DD}.m3u";

pub const CONFIG_ENV_VAR: &str = "PLAYLIST_MATCH_CONFIG";
pub const APP_DIR_NAME: &str = "playlist-match";
pub const CACHE_FILE_NAME: &str = "library_index.sqlite";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// File schema
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub library: LibrarySettings,
    pub matching: MatchingSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub interactive: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    pub root: Option<PathBuf>,
    pub extensions: Vec<String>,
    pub cache_enabled: bool,
    pub cache_path: Option<PathBuf>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            root: None,
            extensions: strings(DEFAULT_EXTENSIONS),
            cache_enabled: true,
            cache_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    pub threshold: i64,
    pub live_penalty: f64,
    pub margin: i64,
    pub max_candidates: usize,
    pub artist_gate: i64,
    pub title_weight: f64,
    pub live_album_keywords: Vec<String>,
    pub strip_keywords: Vec<String>,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            live_penalty: DEFAULT_LIVE_PENALTY,
            margin: DEFAULT_MARGIN,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            artist_gate: DEFAULT_ARTIST_GATE,
            title_weight: DEFAULT_TITLE_WEIGHT,
            live_album_keywords: strings(DEFAULT_LIVE_ALBUM_KEYWORDS),
            strip_keywords: strings(DEFAULT_STRIP_KEYWORDS),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub output_dir: Option<PathBuf>,
    pub name_format: String,
    pub missing_dir: Option<PathBuf>,
    /// Base directory M3U entries are made relative to (MPD's music_directory).
    pub music_dir: Option<PathBuf>,
    pub mpd_playlist_dir: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            name_format: DEFAULT_OUTPUT_NAME_FORMAT.to_string(),
            missing_dir: None,
            music_dir: None,
            mpd_playlist_dir: None,
        }
    }
}

// ============================================================================
// Validated matching configuration
// ============================================================================

/// Validated, compiled matching parameters passed to Scorer and Matcher.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub threshold: u8,
    pub live_penalty: f64,
    pub margin: u8,
    pub max_candidates: usize,
    pub artist_gate: u8,
    pub title_weight: f64,
    pub live_album_patterns: RegexSet,
    pub extensions: Vec<String>,
    pub normalizer: Normalizer,
}

fn percent(value: i64, err: fn(i64) -> ConfigError) -> Result<u8, ConfigError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| err(value))
}

fn unit_interval(value: f64, err: fn(f64) -> ConfigError) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(err(value))
    }
}

/// Lower-case extensions without the leading dot; blanks dropped.
pub fn clean_extensions(extensions: &[String]) -> Vec<String> {
    let mut out: Vec<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Compile live album patterns case-insensitively; the first bad pattern is reported.
pub fn compile_live_patterns(patterns: &[String]) -> Result<RegexSet, ConfigError> {
    for pattern in patterns {
        if let Err(source) = regex::Regex::new(&format!("(?i){}", pattern)) {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            });
        }
    }
    RegexSet::new(patterns.iter().map(|p| format!("(?i){}", p))).map_err(|source| {
        ConfigError::InvalidPattern {
            pattern: patterns.join(", "),
            source,
        }
    })
}

impl Settings {
    /// Load settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Validate the matching section and compile patterns.
    pub fn match_config(&self) -> Result<MatchConfig, ConfigError> {
        let m = &self.matching;
        let threshold = percent(m.threshold, ConfigError::InvalidThreshold)?;
        let margin = percent(m.margin, ConfigError::InvalidMargin)?;
        let artist_gate = percent(m.artist_gate, ConfigError::InvalidArtistGate)?;
        let live_penalty = unit_interval(m.live_penalty, ConfigError::InvalidLivePenalty)?;
        let title_weight = unit_interval(m.title_weight, ConfigError::InvalidTitleWeight)?;
        if m.max_candidates == 0 {
            return Err(ConfigError::InvalidMaxCandidates(m.max_candidates));
        }

        let extensions = clean_extensions(&self.library.extensions);
        if extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }

        Ok(MatchConfig {
            threshold,
            live_penalty,
            margin,
            max_candidates: m.max_candidates,
            artist_gate,
            title_weight,
            live_album_patterns: compile_live_patterns(&m.live_album_keywords)?,
            extensions,
            normalizer: Normalizer::new(&m.strip_keywords)?,
        })
    }
}

// ============================================================================
// Paths
// ============================================================================

/// Resolve the config path from `PLAYLIST_MATCH_CONFIG` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(p));
    }
    xdg_dir("XDG_CONFIG_HOME", ".config").map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Default cache database location under `$XDG_CACHE_HOME/playlist-match/`.
pub fn default_cache_path() -> Option<PathBuf> {
    xdg_dir("XDG_CACHE_HOME", ".cache").map(|d| d.join(APP_DIR_NAME).join(CACHE_FILE_NAME))
}

fn xdg_dir(var: &str, home_fallback: &str) -> Option<PathBuf> {
    if let Some(dir) = env::var_os(var) {
        return Some(PathBuf::from(dir));
    }
    env::var_os("HOME").map(|home| PathBuf::from(home).join(home_fallback))
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
