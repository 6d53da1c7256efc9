//! playlist-match: turn a text list of "Artist - Track" lines into an M3U
//! playlist of files from a local music library.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use playlist_match::cache::{CacheAdapter, NoCache, SqliteCache};
use playlist_match::config::{default_cache_path, expand_home, resolve_config_path, Settings};
use playlist_match::library::{LibraryIndex, LiveDetector};
use playlist_match::matcher::Matcher;
use playlist_match::metadata::LoftyReader;
use playlist_match::playlist::{
    copy_to_playlist_dir, default_output_path, read_playlist, write_m3u, write_missing_report,
};
use playlist_match::progress::{format_duration, set_log_only};
use playlist_match::prompt::TerminalPrompt;
use playlist_match::resolver::{AutoAccept, DecisionSource};
use playlist_match::safety::validate_output_path;
use playlist_match::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogMode {
    Append,
    Overwrite,
}

#[derive(Parser, Debug)]
#[command(
    name = "playlist-match",
    about = "Match 'Artist - Track' lines against a local music library and write an M3U playlist"
)]
struct Args {
    /// Text file with one "Artist - Track" per line ('#' starts a comment)
    playlist_file: PathBuf,

    /// Music library root (overrides [library] root)
    #[arg(short, long)]
    library: Option<PathBuf>,

    /// Config file (default: $PLAYLIST_MATCH_CONFIG or ~/.config/playlist-match/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Minimum score (0-100) for a candidate to count
    #[arg(long)]
    threshold: Option<i64>,

    /// Multiplier (0.0-1.0) applied on live/studio mismatch
    #[arg(long)]
    live_penalty: Option<f64>,

    /// Score gap needed to accept the best candidate without asking
    #[arg(long)]
    margin: Option<i64>,

    #[arg(long)]
    max_candidates: Option<usize>,

    /// Comma-separated audio extensions, e.g. mp3,flac
    #[arg(long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Comma-separated regexes marking live albums
    #[arg(long, value_delimiter = ',')]
    live_album_keywords: Option<Vec<String>>,

    /// Comma-separated keywords removed from bracketed title segments
    #[arg(long, value_delimiter = ',')]
    strip_keywords: Option<Vec<String>>,

    /// Ask on ambiguous or missing tracks
    #[arg(short, long)]
    interactive: bool,

    /// Output M3U path (default: <output-dir>/<expanded --output-name-format>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output file name template, e.g. "{basename:cp}_{YYYY}-{MM}-{DD}.m3u".
    /// Basename transforms: c/u/l for case, p/s/_ for separators
    #[arg(long)]
    output_name_format: Option<String>,

    /// Directory for the missing-tracks report (default: next to the M3U)
    #[arg(long)]
    missing_dir: Option<PathBuf>,

    /// Write M3U entries relative to this directory (MPD music_directory)
    #[arg(long)]
    music_dir: Option<PathBuf>,

    /// Also copy the M3U into this directory (MPD playlist_directory)
    #[arg(long)]
    mpd_playlist_dir: Option<PathBuf>,

    /// Library cache database path
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Disable the library cache for this run
    #[arg(long)]
    no_cache: bool,

    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogMode::Append)]
    log_mode: LogMode,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Hide progress bars and log periodic progress lines instead
    #[arg(long)]
    log_only: bool,

    /// Seed for random-by-artist picks
    #[arg(long)]
    seed: Option<u64>,

    /// Write run statistics as JSON to this file
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// Threads for tag reading (0 = all cores)
    #[arg(long, default_value = "0")]
    workers: usize,
}

fn init_logging(args: &Args) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(args.log_mode == LogMode::Append)
                .truncate(args.log_mode == LogMode::Overwrite)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Command-line values win over the config file.
fn apply_overrides(settings: &mut Settings, args: &Args) {
    let m = &mut settings.matching;
    if let Some(v) = args.threshold {
        m.threshold = v;
    }
    if let Some(v) = args.live_penalty {
        m.live_penalty = v;
    }
    if let Some(v) = args.margin {
        m.margin = v;
    }
    if let Some(v) = args.max_candidates {
        m.max_candidates = v;
    }
    if let Some(v) = &args.live_album_keywords {
        m.live_album_keywords = v.clone();
    }
    if let Some(v) = &args.strip_keywords {
        m.strip_keywords = v.clone();
    }

    let lib = &mut settings.library;
    if let Some(v) = &args.library {
        lib.root = Some(v.clone());
    }
    if let Some(v) = &args.extensions {
        lib.extensions = v.clone();
    }
    if let Some(v) = &args.cache_path {
        lib.cache_path = Some(v.clone());
    }
    if args.no_cache {
        lib.cache_enabled = false;
    }

    let out = &mut settings.output;
    if let Some(v) = &args.output_dir {
        out.output_dir = Some(v.clone());
    }
    if let Some(v) = &args.output_name_format {
        out.name_format = v.clone();
    }
    if let Some(v) = &args.missing_dir {
        out.missing_dir = Some(v.clone());
    }
    if let Some(v) = &args.music_dir {
        out.music_dir = Some(v.clone());
    }
    if let Some(v) = &args.mpd_playlist_dir {
        out.mpd_playlist_dir = Some(v.clone());
    }

    if args.interactive {
        settings.general.interactive = true;
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Settings::load(path)?
        }
        None => match resolve_config_path() {
            Some(path) => Settings::load(&path)?,
            None => Settings::default(),
        },
    };
    apply_overrides(&mut settings, args);
    Ok(settings)
}

fn open_cache(enabled: bool, path: Option<&Path>) -> Box<dyn CacheAdapter> {
    let Some(path) = path.filter(|_| enabled) else {
        tracing::info!("library cache disabled");
        return Box::new(NoCache);
    };
    match SqliteCache::open(path) {
        Ok(cache) => {
            tracing::info!(path = %path.display(), "using library cache");
            Box::new(cache)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot open library cache, continuing without it");
            Box::new(NoCache)
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    set_log_only(args.log_only);

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let start = Instant::now();

    let settings = load_settings(&args)?;
    let config = settings
        .match_config()
        .context("Invalid matching configuration")?;

    let Some(root) = settings.library.root.as_deref().map(expand_home) else {
        bail!("No music library given: pass --library or set [library] root in the config file");
    };

    let input = args.playlist_file.clone();
    let output = match &args.output {
        Some(p) => p.clone(),
        None => default_output_path(
            &input,
            settings.output.output_dir.as_deref().map(expand_home).as_deref(),
            &settings.output.name_format,
            &chrono::Local::now().naive_local(),
        ),
    };
    let cache_path = settings
        .library
        .cache_path
        .as_deref()
        .map(expand_home)
        .or_else(default_cache_path);

    let mut protected: Vec<&Path> = vec![input.as_path()];
    if let Some(p) = &cache_path {
        protected.push(p.as_path());
    }
    validate_output_path(&output, &protected)?;

    let (queries, input_errors) = read_playlist(&input, &config.normalizer)?;
    tracing::info!(
        lines = queries.len(),
        malformed = input_errors.len(),
        path = %input.display(),
        "read playlist"
    );

    // Library scan
    let scan_start = Instant::now();
    let mut cache = open_cache(settings.library.cache_enabled, cache_path.as_deref());
    let live = LiveDetector::new(config.live_album_patterns.clone());
    let index = LibraryIndex::build(
        &root,
        &config.extensions,
        cache.as_mut(),
        &LoftyReader,
        &config.normalizer,
        &live,
    )
    .with_context(|| format!("Failed to index music library {}", root.display()))?;
    let scan_elapsed = scan_start.elapsed();

    // Matching
    let matcher = Matcher::new(&config);
    let mut source: Box<dyn DecisionSource> = if settings.general.interactive {
        Box::new(TerminalPrompt::stdio(args.seed))
    } else {
        Box::new(AutoAccept)
    };
    let report = Session::new(&index, &matcher).run(queries, source.as_mut());

    // Output
    let music_dir = settings.output.music_dir.as_deref().map(expand_home);
    let written = write_m3u(&output, &report.lines, music_dir.as_deref())?;

    let missing_dir = settings
        .output
        .missing_dir
        .as_deref()
        .map(expand_home)
        .or_else(|| output.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let missing_report = write_missing_report(&missing_dir, &output, &input, &report.lines)?;

    if let Some(dir) = settings.output.mpd_playlist_dir.as_deref().map(expand_home) {
        copy_to_playlist_dir(&output, &dir)?;
    }

    // Stats
    let scan = index.scan_stats();
    let mut stats = report.stats;
    stats.library_files = scan.files;
    stats.cache_hits = scan.cache_hits;
    stats.cache_misses = scan.cache_misses;
    stats.unreadable_files = scan.unreadable;
    stats.malformed_lines = input_errors.len();
    stats.scan_seconds = scan_elapsed.as_secs_f64();
    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    stats.log_phase("final");
    if let Some(path) = &args.stats_json {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {}", path.display()))?;
    }

    println!(
        "Wrote {} of {} tracks to {} ({:.1}% matched) in {}",
        written,
        stats.input_lines,
        output.display(),
        stats.match_rate(),
        format_duration(start.elapsed())
    );
    if let Some(path) = missing_report {
        println!("Missing tracks listed in {}", path.display());
    }
    if stats.aborted {
        println!("Aborted: {} lines were not processed", stats.unprocessed);
    }

    Ok(())
}
