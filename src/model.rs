//! Core input model shared across components.
//!
//! A `RawResult` is one file hit from the peer-to-peer search network,
//! exactly as the search collaborator produced it: noisy, inconsistently
//! cased, sometimes missing album information entirely.

use serde::{Deserialize, Serialize};

use crate::normalize;

/// One file result from the peer-to-peer search network.
///
/// Immutable once constructed. The artist/title/album text is whatever the
/// remote peer's filenames yielded and must never be trusted for naming
/// without going through resolution or sanitization first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResult {
    /// Artist text as parsed from the remote filename.
    pub artist: String,
    /// Track title text as parsed from the remote filename.
    pub title: String,
    /// Album text, when the remote folder structure suggested one.
    pub album: Option<String>,
    /// File extension without the leading dot (e.g. "flac", "mp3").
    pub ext: String,
    /// Claimed bitrate in kbit/s, when the peer reported one.
    pub bitrate_kbps: Option<u32>,
    /// Identifier of the peer offering the file.
    pub peer: String,
    /// File size as claimed by the peer, in bytes.
    pub size_bytes: u64,
}

impl RawResult {
    /// The album text when it is usable as an album identity.
    ///
    /// Returns None for absent, empty, or placeholder values ("Unknown",
    /// "Various Artists", ...) so callers never group tracks under a
    /// placeholder folder.
    pub fn album_text(&self) -> Option<&str> {
        self.album
            .as_deref()
            .filter(|a| !normalize::is_placeholder(a))
    }

    /// "NN - Title.ext"-style display label for logging.
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}
