//! Final file-placement resolution for one track.
//!
//! Combines the classification engine's naming plan with the album
//! consistency cache and produces the concrete destination: directory,
//! sanitized file name, and the cover-art path for album placements.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::naming::{AlbumNameCache, ClassificationEngine, ClassificationInput, NamingPlan};
use crate::normalize::sanitize_component;

/// Resolved destination for one track.
#[derive(Debug, Clone)]
pub struct TrackPlacement {
    /// Directory the file belongs in (music root / artist [/ album]).
    pub directory: PathBuf,
    /// Sanitized final file name.
    pub file_name: String,
    /// Cover-art destination, present for album placements.
    pub cover_path: Option<PathBuf>,
    /// The naming plan the placement was derived from.
    pub plan: NamingPlan,
}

impl TrackPlacement {
    /// Full destination path of the audio file.
    pub fn final_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Turns classification inputs into concrete filesystem destinations.
pub struct PlacementResolver {
    engine: ClassificationEngine,
    cache: Arc<AlbumNameCache>,
    music_root: PathBuf,
    /// Maximum length of one sanitized path component, in characters.
    max_component_len: usize,
}

impl PlacementResolver {
    pub fn new(cache: Arc<AlbumNameCache>, music_root: PathBuf, max_component_len: usize) -> Self {
        Self {
            engine: ClassificationEngine::new(),
            cache,
            music_root,
            max_component_len,
        }
    }

    /// Resolve the placement for one track.
    ///
    /// The album display name passes through the consistency cache before
    /// any path is built, so every track of one logical album lands in the
    /// same folder no matter the order jobs complete in.
    pub async fn resolve(&self, input: &ClassificationInput<'_>) -> TrackPlacement {
        let mut plan = self.engine.classify(input);

        if let Some(album_name) = plan.album_name.take() {
            let canonical = self.cache.resolve(&plan.artist, &album_name).await;
            plan.album_name = Some(canonical);
        }

        let artist_dir = sanitize_component(&plan.artist, self.max_component_len);
        let mut directory = self.music_root.join(&artist_dir);

        let mut cover_path = None;
        if let Some(folder) = plan.album_folder() {
            let album_dir = sanitize_component(&folder, self.max_component_len);
            directory = directory.join(&album_dir);
            cover_path = Some(directory.join("cover.jpg"));
        }

        let file_name = sanitize_component(&plan.file_name(), self.max_component_len);

        debug!(
            "Placement for {}: {:?}/{}",
            input.raw.label(),
            directory,
            file_name
        );

        TrackPlacement {
            directory,
            file_name,
            cover_path,
            plan,
        }
    }
}
