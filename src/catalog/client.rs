//! HTTP client for the external metadata catalog service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{CatalogAlbum, CatalogArtist, CatalogError, CatalogQuery, CatalogTrack};

#[derive(Debug, Deserialize)]
struct ArtistSearchResponse {
    results: Vec<CatalogArtist>,
}

#[derive(Debug, Deserialize)]
struct TrackSearchResponse {
    results: Vec<CatalogTrack>,
}

/// Client for the catalog daemon's HTTP API.
#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    base_url: String,
}

impl CatalogHttpClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the catalog service (e.g. "http://localhost:7700")
    /// * `timeout_secs` - Request timeout in seconds
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CatalogError::Http(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(e: reqwest::Error) -> CatalogError {
        if e.is_timeout() {
            CatalogError::Timeout
        } else {
            CatalogError::Http(e.to_string())
        }
    }

    fn check_status(status: StatusCode) -> Result<(), CatalogError> {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::RateLimited);
        }
        if !status.is_success() {
            return Err(CatalogError::Http(format!(
                "catalog returned status {}",
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogQuery for CatalogHttpClient {
    async fn search_artists(&self, text: &str) -> Result<Vec<CatalogArtist>, CatalogError> {
        let url = format!("{}/artists/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", text)])
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::check_status(response.status())?;

        let parsed: ArtistSearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        Ok(parsed.results)
    }

    async fn search_tracks(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<CatalogTrack>, CatalogError> {
        let url = format!("{}/tracks/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("artist", artist), ("title", title)])
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::check_status(response.status())?;

        let parsed: TrackSearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        Ok(parsed.results)
    }

    async fn get_album(&self, album_id: &str) -> Result<Option<CatalogAlbum>, CatalogError> {
        let url = format!("{}/albums/{}", self.base_url, album_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::check_status(response.status())?;

        let album: CatalogAlbum = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        Ok(Some(album))
    }

    async fn get_cover_art(&self, album_id: &str) -> Result<Vec<u8>, CatalogError> {
        let url = format!("{}/albums/{}/cover", self.base_url, album_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::check_status(response.status())?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
