//! Audio tag extraction.

use lofty::prelude::*;
use std::path::Path;

use crate::error::MetadataError;
use crate::models::TrackTags;

/// Reads raw tags from an audio file. `None` means the file is unreadable;
/// the index keeps such files with empty metadata.
pub trait MetadataReader: Sync {
    fn read(&self, path: &Path) -> Option<TrackTags>;
}

/// `lofty`-backed reader: primary tag (first tag as fallback), album artist
/// when the track artist is missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyReader;

impl LoftyReader {
    pub fn try_read(&self, path: &Path) -> Result<TrackTags, MetadataError> {
        let tagged = lofty::read_from_path(path).map_err(|e| MetadataError::Read(e.to_string()))?;

        let secs = tagged.properties().duration().as_secs();
        let duration = u32::try_from(secs).ok().filter(|d| *d > 0);

        let mut tags = TrackTags {
            duration,
            ..Default::default()
        };
        if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
            tags.title = tag.title().map(|s| s.trim().to_string()).unwrap_or_default();
            tags.album = tag.album().map(|s| s.trim().to_string()).unwrap_or_default();
            tags.artist = tag
                .artist()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    tag.get_string(&ItemKey::AlbumArtist)
                        .map(|s| s.trim().to_string())
                })
                .unwrap_or_default();
        }
        Ok(tags)
    }
}

impl MetadataReader for LoftyReader {
    fn read(&self, path: &Path) -> Option<TrackTags> {
        match self.try_read(path) {
            Ok(tags) => Some(tags),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "unreadable audio file");
                None
            }
        }
    }
}
