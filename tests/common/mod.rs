//! Shared fixtures for the end-to-end orchestrator tests.
//!
//! The harness wires a real SyncManager to an in-memory catalog, a
//! scripted transfer client and a tempdir-backed real filesystem, so
//! tests exercise the full pipeline without any network.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use soulshelf::catalog::{
    CatalogAlbum, CatalogArtist, CatalogError, CatalogQuery, CatalogTrack,
};
use soulshelf::config::{OrganizerSettings, ResolverSettings};
use soulshelf::confirm::NoConfirmation;
use soulshelf::fsops::DiskFileOps;
use soulshelf::model::RawResult;
use soulshelf::naming::AlbumNameCache;
use soulshelf::normalize::{fold_identity, EditionPatterns, DEFAULT_EDITION_QUALIFIERS};
use soulshelf::orchestrator::{BatchReport, JobOutcome, SyncManager};
use soulshelf::placement::PlacementResolver;
use soulshelf::resolver::MetadataResolver;
use soulshelf::transfer::{TransferClient, TransferError};

/// In-memory catalog with fixed records.
#[derive(Default)]
pub struct MemoryCatalog {
    pub artists: Vec<CatalogArtist>,
    pub tracks: Vec<CatalogTrack>,
    pub albums: Vec<CatalogAlbum>,
    /// Every query fails with a timeout when set.
    pub fail: bool,
    pub cover_bytes: Vec<u8>,
}

#[async_trait]
impl CatalogQuery for MemoryCatalog {
    async fn search_artists(&self, text: &str) -> Result<Vec<CatalogArtist>, CatalogError> {
        if self.fail {
            return Err(CatalogError::Timeout);
        }
        let query = fold_identity(text);
        Ok(self
            .artists
            .iter()
            .filter(|a| fold_identity(&a.name) == query)
            .cloned()
            .collect())
    }

    async fn search_tracks(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<CatalogTrack>, CatalogError> {
        if self.fail {
            return Err(CatalogError::Timeout);
        }
        let artist_query = fold_identity(artist);
        let title_query = fold_identity(title);
        Ok(self
            .tracks
            .iter()
            .filter(|t| {
                fold_identity(&t.artist_name) == artist_query
                    && fold_identity(&t.name) == title_query
            })
            .cloned()
            .collect())
    }

    async fn get_album(&self, album_id: &str) -> Result<Option<CatalogAlbum>, CatalogError> {
        if self.fail {
            return Err(CatalogError::Timeout);
        }
        Ok(self.albums.iter().find(|a| a.id == album_id).cloned())
    }

    async fn get_cover_art(&self, _album_id: &str) -> Result<Vec<u8>, CatalogError> {
        if self.fail {
            return Err(CatalogError::Timeout);
        }
        Ok(self.cover_bytes.clone())
    }
}

/// Transfer client whose behavior is scripted through the peer id:
/// - `fail-...`: every fetch fails with a peer error;
/// - `flaky-N-...`: the first N fetches for that peer fail, later ones
///   succeed;
/// - `hang-...`: blocks until the cancellation token fires;
/// - anything else: writes `size_bytes` zero bytes and succeeds.
pub struct ScriptedTransfer {
    total_calls: AtomicU32,
    per_peer: Mutex<HashMap<String, u32>>,
}

impl ScriptedTransfer {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicU32::new(0),
            per_peer: Mutex::new(HashMap::new()),
        }
    }

    pub fn total_calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub async fn calls_for(&self, peer: &str) -> u32 {
        *self.per_peer.lock().await.get(peer).unwrap_or(&0)
    }

    fn flaky_failures(peer: &str) -> Option<u32> {
        peer.strip_prefix("flaky-")
            .and_then(|rest| rest.split('-').next())
            .and_then(|n| n.parse().ok())
    }
}

#[async_trait]
impl TransferClient for ScriptedTransfer {
    async fn fetch(
        &self,
        raw: &RawResult,
        staging_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let peer_calls = {
            let mut per_peer = self.per_peer.lock().await;
            let entry = per_peer.entry(raw.peer.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if raw.peer.starts_with("fail") {
            return Err(TransferError::Peer("peer rejected the transfer".to_string()));
        }
        if raw.peer.starts_with("hang") {
            cancel.cancelled().await;
            return Err(TransferError::Cancelled);
        }
        if let Some(failures) = Self::flaky_failures(&raw.peer) {
            if peer_calls <= failures {
                return Err(TransferError::Peer(format!(
                    "flaky peer failure {}",
                    peer_calls
                )));
            }
        }

        let bytes = vec![0u8; raw.size_bytes as usize];
        tokio::fs::write(staging_path, &bytes)
            .await
            .map_err(|e| TransferError::Io(e.to_string()))?;
        Ok(raw.size_bytes)
    }
}

/// A fully wired manager over temp directories.
pub struct TestHarness {
    pub manager: Arc<SyncManager>,
    pub transfer: Arc<ScriptedTransfer>,
    pub music_root: TempDir,
    pub staging_dir: PathBuf,
    pub shutdown: CancellationToken,
}

impl TestHarness {
    pub fn music_path(&self, components: &[&str]) -> PathBuf {
        let mut path = self.music_root.path().to_path_buf();
        for c in components {
            path = path.join(c);
        }
        path
    }

    /// Artist directories currently present under the music root.
    pub fn artist_dirs(&self) -> Vec<String> {
        let mut dirs = Vec::new();
        if let Ok(entries) = std::fs::read_dir(self.music_root.path()) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.path().is_dir() && name != ".staging" {
                    dirs.push(name);
                }
            }
        }
        dirs.sort();
        dirs
    }
}

/// Settings tuned for fast tests.
pub fn test_settings() -> OrganizerSettings {
    OrganizerSettings {
        worker_count: 4,
        queue_capacity: 64,
        max_retries: 0,
        initial_backoff_ms: 1,
        max_backoff_ms: 10,
        backoff_multiplier: 2.0,
        fixed_backoff: false,
        verify_recheck_ms: 1,
        verify_max_checks: 3,
        failure_flush_ms: 300,
        success_flush_ms: 300,
        auto_accept: true,
    }
}

pub fn harness(catalog: MemoryCatalog, settings: OrganizerSettings) -> TestHarness {
    let music_root = TempDir::new().unwrap();
    let staging_dir = music_root.path().join(".staging");
    std::fs::create_dir_all(&staging_dir).unwrap();

    let patterns = Arc::new(
        EditionPatterns::from_qualifiers(
            &DEFAULT_EDITION_QUALIFIERS
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        )
        .unwrap(),
    );

    let resolver = Arc::new(MetadataResolver::new(
        Arc::new(catalog),
        ResolverSettings::default(),
        patterns.clone(),
    ));
    let cache = Arc::new(AlbumNameCache::new(patterns));
    let placement = Arc::new(PlacementResolver::new(
        cache,
        music_root.path().to_path_buf(),
        120,
    ));

    let transfer = Arc::new(ScriptedTransfer::new());
    let shutdown = CancellationToken::new();
    let manager = SyncManager::new(
        resolver,
        placement,
        transfer.clone(),
        Arc::new(DiskFileOps),
        Arc::new(NoConfirmation),
        settings,
        staging_dir.clone(),
        shutdown.clone(),
    );

    TestHarness {
        manager,
        transfer,
        music_root,
        staging_dir,
        shutdown,
    }
}

pub fn raw(artist: &str, title: &str, album: Option<&str>, peer: &str) -> RawResult {
    RawResult {
        artist: artist.to_string(),
        title: title.to_string(),
        album: album.map(|a| a.to_string()),
        ext: "flac".to_string(),
        bitrate_kbps: Some(1024),
        peer: peer.to_string(),
        size_bytes: 64,
    }
}

/// Collect batched reports until `total` outcomes have arrived (or panic
/// after a timeout). Returns the reports in arrival order.
pub async fn collect_reports(
    rx: &mut tokio::sync::broadcast::Receiver<BatchReport>,
    batch_id: &str,
    total: usize,
) -> Vec<BatchReport> {
    let mut reports = Vec::new();
    let mut seen = 0usize;

    let deadline = Duration::from_secs(10);
    while seen < total {
        let report = tokio::time::timeout(deadline, rx.recv())
            .await
            .expect("timed out waiting for batch report")
            .expect("report channel closed");
        if report.batch_id != batch_id {
            continue;
        }
        seen += report.completed.len() + report.failed.len() + report.cancelled.len();
        reports.push(report);
    }
    reports
}

/// All outcomes across a report list, flattened in arrival order.
pub fn all_outcomes(reports: &[BatchReport]) -> Vec<&JobOutcome> {
    reports
        .iter()
        .flat_map(|r| {
            r.completed
                .iter()
                .chain(r.failed.iter())
                .chain(r.cancelled.iter())
        })
        .collect()
}

/// Catalog fixture: Billie Eilish with one album track.
pub fn billie_catalog() -> MemoryCatalog {
    MemoryCatalog {
        artists: vec![CatalogArtist {
            id: "art-billie".to_string(),
            name: "Billie Eilish".to_string(),
        }],
        tracks: vec![CatalogTrack {
            id: "trk-badguy".to_string(),
            name: "bad guy".to_string(),
            track_number: Some(2),
            album_id: Some("alb-wwafa".to_string()),
            artist_id: "art-billie".to_string(),
            artist_name: "Billie Eilish".to_string(),
        }],
        albums: vec![CatalogAlbum {
            id: "alb-wwafa".to_string(),
            name: "WHEN WE ALL FALL ASLEEP, WHERE DO WE GO?".to_string(),
            album_type: soulshelf::catalog::AlbumType::Album,
            total_tracks: 14,
            artist_id: "art-billie".to_string(),
            artist_name: "Billie Eilish".to_string(),
            release_date: Some("2019-03-29".to_string()),
        }],
        fail: false,
        cover_bytes: vec![0xff, 0xd8, 0xff, 0xe0],
    }
}
