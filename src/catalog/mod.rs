//! Authoritative music-metadata catalog interface.
//!
//! Records are immutable once fetched; nothing here persists across jobs.
//! The catalog is remote and rate-limited, so every error is a soft
//! failure from the caller's point of view: resolution degrades to
//! heuristic naming, it never blocks a transfer.

mod client;

pub use client::CatalogHttpClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Album type as the catalog classifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumType {
    Album,
    Single,
    Compilation,
}

impl AlbumType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumType::Album => "album",
            AlbumType::Single => "single",
            AlbumType::Compilation => "compilation",
        }
    }
}

/// Authoritative artist record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogArtist {
    /// Stable catalog id.
    pub id: String,
    /// Canonical display name.
    pub name: String,
}

/// Authoritative album record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogAlbum {
    pub id: String,
    /// Canonical display name, possibly edition-qualified
    /// ("... (Deluxe Edition)").
    pub name: String,
    pub album_type: AlbumType,
    pub total_tracks: u32,
    pub artist_id: String,
    pub artist_name: String,
    /// Release date as the catalog reports it (ISO-8601 date string).
    pub release_date: Option<String>,
}

/// Authoritative track record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    /// Canonical track title.
    pub name: String,
    /// 1-based position on the album, when the catalog knows it.
    pub track_number: Option<u32>,
    pub album_id: Option<String>,
    pub artist_id: String,
    pub artist_name: String,
}

/// Errors from the catalog service. All of them are soft: callers degrade
/// to fallback naming rather than failing the job.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request timed out")]
    Timeout,
    #[error("catalog rate limit exceeded")]
    RateLimited,
    #[error("catalog request failed: {0}")]
    Http(String),
    #[error("catalog response could not be decoded: {0}")]
    Decode(String),
}

/// Query interface to the external metadata catalog.
#[async_trait]
pub trait CatalogQuery: Send + Sync {
    /// Search artists by free text.
    async fn search_artists(&self, text: &str) -> Result<Vec<CatalogArtist>, CatalogError>;

    /// Search tracks by artist and title text.
    async fn search_tracks(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<CatalogTrack>, CatalogError>;

    /// Fetch one album by id. Ok(None) when the catalog does not know it.
    async fn get_album(&self, album_id: &str) -> Result<Option<CatalogAlbum>, CatalogError>;

    /// Fetch cover art bytes for an album.
    async fn get_cover_art(&self, album_id: &str) -> Result<Vec<u8>, CatalogError>;
}
