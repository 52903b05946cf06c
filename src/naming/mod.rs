//! Album-vs-single classification and canonical naming.
//!
//! Given whatever metadata a job has managed to gather (possibly nothing),
//! decide whether the track belongs in an album folder and what every path
//! component should be called. The rules are ordered; the first one that
//! applies wins.

pub mod album_cache;

pub use album_cache::AlbumNameCache;

use serde::Serialize;

use crate::catalog::{AlbumType, CatalogAlbum, CatalogArtist, CatalogTrack};
use crate::model::RawResult;
use crate::normalize::{clean_display, fold_identity};

/// Where a resolved name came from, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    Forced,
    Catalog,
    Fallback,
}

/// The resolved naming decision for one track.
///
/// Names here are display text; filesystem sanitization happens when the
/// placement resolver turns the plan into actual path components.
#[derive(Debug, Clone, Serialize)]
pub struct NamingPlan {
    pub is_album: bool,
    /// Canonical artist display name (never raw peer-supplied text when
    /// catalog data exists).
    pub artist: String,
    /// Album display name, absent for singles. Subject to consistency-cache
    /// canonicalization before any path is built.
    pub album_name: Option<String>,
    /// Track title.
    pub title: String,
    pub track_number: Option<u32>,
    /// File extension without the leading dot.
    pub ext: String,
    pub artist_source: NameSource,
    pub album_source: Option<NameSource>,
    pub title_source: NameSource,
}

impl NamingPlan {
    /// Album folder display name: "{artist} - {album}".
    pub fn album_folder(&self) -> Option<String> {
        self.album_name
            .as_ref()
            .map(|album| format!("{} - {}", self.artist, album))
    }

    /// Track file name: "NN - Title.ext" when a number is known.
    pub fn file_name(&self) -> String {
        let stem = match self.track_number {
            Some(n) => format!("{:02} - {}", n, self.title),
            None => self.title.clone(),
        };
        if self.ext.is_empty() {
            stem
        } else {
            // Trailing dots in the stem would double up with the extension dot
            format!("{}.{}", stem.trim_end_matches(['.', ' ']), self.ext)
        }
    }
}

/// Everything classification may consult for one track. Fields other than
/// `raw` are optional: the engine must produce a plan from any subset.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationInput<'a> {
    pub raw: &'a RawResult,
    /// Canonical artist, when resolution produced one.
    pub artist: Option<&'a CatalogArtist>,
    /// Catalog track, when resolution matched one.
    pub track: Option<&'a CatalogTrack>,
    /// Catalog album, when resolution (or album context) found one.
    pub album: Option<&'a CatalogAlbum>,
    /// Caller-confirmed canonical title, highest title priority.
    pub confirmed_title: Option<&'a str>,
    /// The caller explicitly requested album structure.
    pub forced_album_mode: bool,
    /// Album name the caller forced, if any.
    pub forced_album_name: Option<&'a str>,
    /// The job carried album identity before resolution ran.
    pub album_context: bool,
    /// 1-based position within the originating batch, the track-number
    /// fallback when the catalog has none.
    pub batch_seq: Option<u32>,
}

/// The rules-based album-vs-single decision procedure.
pub struct ClassificationEngine;

impl ClassificationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Produce a naming plan. Deterministic: the same inputs always yield
    /// the same decision.
    pub fn classify(&self, input: &ClassificationInput<'_>) -> NamingPlan {
        let (artist, artist_source) = self.artist_name(input);
        let (title, title_source) = self.title(input);

        // Rule 1: forced album mode wins unconditionally.
        if input.forced_album_mode {
            let (album_name, album_source) = self.forced_album_name(input, &title);
            return NamingPlan {
                is_album: true,
                track_number: self.track_number(input, true),
                album_name: Some(album_name),
                album_source: Some(album_source),
                artist,
                title,
                ext: input.raw.ext.clone(),
                artist_source,
                title_source,
            };
        }

        // Rule 2: the job already carried album identity and the catalog
        // confirmed an album within that context.
        if input.album_context {
            if let Some(album) = input.album {
                return NamingPlan {
                    is_album: true,
                    track_number: self.track_number(input, true),
                    album_name: Some(album.name.clone()),
                    album_source: Some(NameSource::Catalog),
                    artist,
                    title,
                    ext: input.raw.ext.clone(),
                    artist_source,
                    title_source,
                };
            }
        }

        // Rule 3: catalog-derived decision. Requires the catalog to mark
        // the release as a proper multi-track album whose name is neither
        // the track title (self-titled lead single) nor the artist name
        // (singles with the artist in the album field).
        if let Some(album) = input.album {
            let album_fold = fold_identity(&album.name);
            let is_album = album.album_type == AlbumType::Album
                && album.total_tracks > 1
                && album_fold != fold_identity(&title)
                && album_fold != fold_identity(&artist);

            if is_album {
                return NamingPlan {
                    is_album: true,
                    track_number: self.track_number(input, true),
                    album_name: Some(album.name.clone()),
                    album_source: Some(NameSource::Catalog),
                    artist,
                    title,
                    ext: input.raw.ext.clone(),
                    artist_source,
                    title_source,
                };
            }
        }

        // Rule 4: no usable catalog album. Single, fallback naming.
        NamingPlan {
            is_album: false,
            track_number: self.track_number(input, false),
            album_name: None,
            album_source: None,
            artist,
            title,
            ext: input.raw.ext.clone(),
            artist_source,
            title_source,
        }
    }

    /// Canonical artist display name. Raw peer text is the last resort so
    /// tracks resolved against the catalog always agree across jobs.
    fn artist_name(&self, input: &ClassificationInput<'_>) -> (String, NameSource) {
        if let Some(artist) = input.artist {
            return (artist.name.clone(), NameSource::Catalog);
        }
        if let Some(track) = input.track {
            return (track.artist_name.clone(), NameSource::Catalog);
        }
        let cleaned = clean_display(&input.raw.artist);
        if cleaned.is_empty() {
            ("Unknown Artist".to_string(), NameSource::Fallback)
        } else {
            (cleaned, NameSource::Fallback)
        }
    }

    /// Title priority: caller-confirmed, catalog, sanitized raw.
    fn title(&self, input: &ClassificationInput<'_>) -> (String, NameSource) {
        if let Some(confirmed) = input.confirmed_title {
            return (clean_display(confirmed), NameSource::Catalog);
        }
        if let Some(track) = input.track {
            return (track.name.clone(), NameSource::Catalog);
        }
        let cleaned = clean_display(&input.raw.title);
        if cleaned.is_empty() {
            ("Untitled".to_string(), NameSource::Fallback)
        } else {
            (cleaned, NameSource::Fallback)
        }
    }

    /// Album name under forced mode: forced name, then catalog, then raw
    /// album text, then the track title as the last resort.
    fn forced_album_name(
        &self,
        input: &ClassificationInput<'_>,
        title: &str,
    ) -> (String, NameSource) {
        if let Some(name) = input.forced_album_name {
            return (clean_display(name), NameSource::Forced);
        }
        if let Some(album) = input.album {
            return (album.name.clone(), NameSource::Catalog);
        }
        if let Some(raw_album) = input.raw.album_text() {
            return (clean_display(raw_album), NameSource::Fallback);
        }
        (title.to_string(), NameSource::Fallback)
    }

    /// Track number priority: catalog, then batch position (album
    /// placements only — singles carry no number prefix).
    fn track_number(&self, input: &ClassificationInput<'_>, is_album: bool) -> Option<u32> {
        if let Some(n) = input.track.and_then(|t| t.track_number) {
            if is_album {
                return Some(n);
            }
            return None;
        }
        if is_album {
            return input.batch_seq;
        }
        None
    }
}

impl Default for ClassificationEngine {
    fn default() -> Self {
        Self::new()
    }
}
