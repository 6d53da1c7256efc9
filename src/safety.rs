//! Output path checks, run before anything is written.
//!
//! The M3U writer truncates its target, so a typo in `--output` must never
//! clobber the input playlist or the library cache.

use anyhow::{bail, Result};
use std::path::Path;

/// Extensions accepted for the generated playlist.
pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8"];

/// Validates that `output` is safe to overwrite.
///
/// - the file name must end in `.m3u` or `.m3u8`
/// - it cannot be any of `protected` (input playlist, cache database)
pub fn validate_output_path(output: &Path, protected: &[&Path]) -> Result<()> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !PLAYLIST_EXTENSIONS.contains(&ext.as_str()) {
        bail!(
            "Safety check failed: output file '{}' must end in .m3u or .m3u8",
            output.display()
        );
    }

    for source in protected {
        if same_file(output, source) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as '{}'",
                output.display(),
                source.display()
            );
        }
    }

    Ok(())
}

/// Path equality, resolving symlinks and relative components when both exist.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
