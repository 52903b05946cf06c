//! Metadata resolution: match one raw search result against the catalog.
//!
//! Strategies run in priority order and short-circuit as soon as one of
//! them produces a candidate above the acceptance threshold:
//! 1. album-context query, when the raw result carries a usable album
//!    identity (preserves grouping the caller already knows);
//! 2. direct artist search;
//! 3. composite track search, deriving the artist from track hits.
//!
//! Catalog failures are soft: resolution returns an empty candidate list
//! and the job proceeds with fallback naming. The resolver also owns the
//! outbound request ceiling toward the catalog, so the orchestrator's
//! worker pool can never exceed the external API's tolerance no matter how
//! many jobs are in flight.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::catalog::{CatalogAlbum, CatalogArtist, CatalogError, CatalogQuery, CatalogTrack};
use crate::config::ResolverSettings;
use crate::matching;
use crate::model::RawResult;
use crate::normalize::{fold_identity, EditionPatterns};

/// Which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    AlbumContext,
    ArtistSearch,
    TrackSearch,
}

impl MatchStrategy {
    /// Human-readable provenance, surfaced alongside candidates so a user
    /// choosing between ambiguous matches can see where each came from.
    pub fn reason(&self) -> &'static str {
        match self {
            MatchStrategy::AlbumContext => "existing album context",
            MatchStrategy::ArtistSearch => "direct artist search",
            MatchStrategy::TrackSearch => "derived from track search",
        }
    }
}

/// A raw result paired with a catalog candidate and a confidence score.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub artist: CatalogArtist,
    /// Present when the strategy matched a concrete track.
    pub track: Option<CatalogTrack>,
    /// Present when the strategy resolved the album as well.
    pub album: Option<CatalogAlbum>,
    /// Confidence in [0, 1].
    pub score: f64,
    pub strategy: MatchStrategy,
    pub reason: String,
}

/// Album identity the caller already holds for a job.
#[derive(Debug, Clone)]
pub struct AlbumHint {
    pub name: String,
    /// Set when a previous resolution in the same batch pinned the album.
    pub album_id: Option<String>,
}

/// Resolves raw search results into ranked catalog candidates.
pub struct MetadataResolver {
    catalog: Arc<dyn CatalogQuery>,
    /// Outbound request ceiling toward the catalog.
    limiter: Semaphore,
    settings: ResolverSettings,
    patterns: Arc<EditionPatterns>,
}

impl MetadataResolver {
    pub fn new(
        catalog: Arc<dyn CatalogQuery>,
        settings: ResolverSettings,
        patterns: Arc<EditionPatterns>,
    ) -> Self {
        let limiter = Semaphore::new(settings.catalog_max_concurrent_requests.max(1));
        Self {
            catalog,
            limiter,
            settings,
            patterns,
        }
    }

    pub fn acceptance_threshold(&self) -> f64 {
        self.settings.acceptance_threshold
    }

    /// Resolve a raw result into an ordered candidate list (best first,
    /// deduplicated by artist, capped). Empty on catalog failure.
    pub async fn resolve(&self, raw: &RawResult, hint: Option<&AlbumHint>) -> Vec<MatchCandidate> {
        let mut merged: Vec<MatchCandidate> = Vec::new();

        let derived_hint;
        let hint = match hint {
            Some(h) => Some(h),
            None => {
                derived_hint = raw.album_text().map(|name| AlbumHint {
                    name: name.to_string(),
                    album_id: None,
                });
                derived_hint.as_ref()
            }
        };

        if let Some(hint) = hint {
            match self.album_context_candidates(raw, hint).await {
                Ok(candidates) => merged.extend(candidates),
                Err(e) => warn!("Album-context lookup failed for {}: {}", raw.label(), e),
            }
            if self.has_confident(&merged) {
                return self.finalize(merged);
            }
        }

        match self.artist_candidates(raw).await {
            Ok(candidates) => merged.extend(candidates),
            Err(e) => warn!("Artist search failed for {}: {}", raw.label(), e),
        }
        if self.has_confident(&merged) {
            return self.finalize(merged);
        }

        match self.track_candidates(raw).await {
            Ok(candidates) => merged.extend(candidates),
            Err(e) => warn!("Track search failed for {}: {}", raw.label(), e),
        }

        self.finalize(merged)
    }

    /// Fetch one album through the resolver's request ceiling.
    pub async fn fetch_album(&self, album_id: &str) -> Result<Option<CatalogAlbum>, CatalogError> {
        let _permit = self.acquire().await?;
        self.catalog.get_album(album_id).await
    }

    /// Fetch cover art through the resolver's request ceiling.
    pub async fn fetch_cover(&self, album_id: &str) -> Result<Vec<u8>, CatalogError> {
        let _permit = self.acquire().await?;
        self.catalog.get_cover_art(album_id).await
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, CatalogError> {
        self.limiter
            .acquire()
            .await
            .map_err(|_| CatalogError::Http("catalog request limiter closed".to_string()))
    }

    /// Strategy 1: resolve within the album context the caller supplied.
    ///
    /// Track hits are kept only when their album shares the hint's base
    /// name (or matches its pinned id), so an existing grouping is never
    /// broken by a stray single hit.
    async fn album_context_candidates(
        &self,
        raw: &RawResult,
        hint: &AlbumHint,
    ) -> Result<Vec<MatchCandidate>, CatalogError> {
        let tracks = {
            let _permit = self.acquire().await?;
            self.catalog.search_tracks(&raw.artist, &raw.title).await?
        };

        let hint_base = fold_identity(&self.patterns.base_name(&hint.name));
        let mut candidates = Vec::new();

        for track in tracks {
            let Some(album_id) = track.album_id.clone() else {
                continue;
            };

            let id_pinned = hint.album_id.as_deref() == Some(album_id.as_str());
            let album = match self.fetch_album(&album_id).await? {
                Some(album) => album,
                None => continue,
            };

            let album_base = fold_identity(&self.patterns.base_name(&album.name));
            if !id_pinned && album_base != hint_base {
                continue;
            }

            let score = matching::score_artist_title(
                &raw.artist,
                &self.patterns.base_name(&raw.title),
                &track.artist_name,
                &self.patterns.base_name(&track.name),
            );
            debug!(
                "Album-context candidate {} / {} scored {:.3} for {}",
                track.artist_name,
                album.name,
                score,
                raw.label()
            );
            candidates.push(MatchCandidate {
                artist: CatalogArtist {
                    id: track.artist_id.clone(),
                    name: track.artist_name.clone(),
                },
                track: Some(track),
                album: Some(album),
                score,
                strategy: MatchStrategy::AlbumContext,
                reason: MatchStrategy::AlbumContext.reason().to_string(),
            });
        }

        Ok(candidates)
    }

    /// Strategy 2: direct artist-name query.
    async fn artist_candidates(
        &self,
        raw: &RawResult,
    ) -> Result<Vec<MatchCandidate>, CatalogError> {
        let artists = {
            let _permit = self.acquire().await?;
            self.catalog.search_artists(&raw.artist).await?
        };

        Ok(artists
            .into_iter()
            .map(|artist| {
                let score = matching::score(&raw.artist, &artist.name);
                MatchCandidate {
                    artist,
                    track: None,
                    album: None,
                    score,
                    strategy: MatchStrategy::ArtistSearch,
                    reason: MatchStrategy::ArtistSearch.reason().to_string(),
                }
            })
            .collect())
    }

    /// Strategy 3: composite track query; the artist comes from the hit.
    async fn track_candidates(&self, raw: &RawResult) -> Result<Vec<MatchCandidate>, CatalogError> {
        let tracks = {
            let _permit = self.acquire().await?;
            self.catalog.search_tracks(&raw.artist, &raw.title).await?
        };

        Ok(tracks
            .into_iter()
            .map(|track| {
                let score = matching::score(&raw.artist, &track.artist_name);
                MatchCandidate {
                    artist: CatalogArtist {
                        id: track.artist_id.clone(),
                        name: track.artist_name.clone(),
                    },
                    track: Some(track),
                    album: None,
                    score,
                    strategy: MatchStrategy::TrackSearch,
                    reason: MatchStrategy::TrackSearch.reason().to_string(),
                }
            })
            .collect())
    }

    fn has_confident(&self, candidates: &[MatchCandidate]) -> bool {
        candidates
            .iter()
            .any(|c| c.score >= self.settings.acceptance_threshold)
    }

    /// Dedupe by artist id (best score wins), sort descending, cap.
    fn finalize(&self, mut candidates: Vec<MatchCandidate>) -> Vec<MatchCandidate> {
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen_artists = std::collections::HashSet::new();
        candidates.retain(|c| seen_artists.insert(c.artist.id.clone()));
        candidates.truncate(self.settings.max_candidates);
        candidates
    }
}
