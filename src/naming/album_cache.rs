//! Process-wide album-name consistency cache.
//!
//! Tracks of one physical album can arrive out of order, resolved from
//! different strategies, with and without edition qualifiers. The cache
//! maps `(artist identity, base album identity)` to the one canonical
//! display name every placement for that key must use, so folders never
//! fragment into "Album" and "Album (Deluxe)" side by side.
//!
//! The cache is explicitly owned and lock-guarded; it is handed to workers
//! as an `Arc`, never reached through module-level mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::normalize::{fold_identity, EditionPatterns};

/// Keyed store of canonical album display names with upgrade merging.
pub struct AlbumNameCache {
    entries: Mutex<HashMap<String, String>>,
    patterns: Arc<EditionPatterns>,
}

impl AlbumNameCache {
    pub fn new(patterns: Arc<EditionPatterns>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            patterns,
        }
    }

    /// Cache key: normalized artist identity + "::" + normalized base album
    /// name (edition qualifiers stripped).
    fn key(&self, artist: &str, album_display: &str) -> String {
        format!(
            "{}::{}",
            fold_identity(artist),
            fold_identity(&self.patterns.base_name(album_display))
        )
    }

    /// Resolve the canonical display name for an album, inserting or
    /// upgrading the cache entry as a single critical section.
    ///
    /// - first sighting of a key caches `album_display` as canonical;
    /// - a later sighting whose name is a strict superset edition of the
    ///   cached one (same base, cached name unqualified, new name
    ///   qualified) upgrades the entry;
    /// - any other same-key sighting keeps the cached name (stability
    ///   bias, prevents oscillation).
    pub async fn resolve(&self, artist: &str, album_display: &str) -> String {
        let key = self.key(artist, album_display);
        let mut entries = self.entries.lock().await;

        match entries.get(&key).cloned() {
            None => {
                debug!("Album cache insert: {} -> {}", key, album_display);
                entries.insert(key, album_display.to_string());
                album_display.to_string()
            }
            Some(cached) => {
                if self.is_upgrade(&cached, album_display) {
                    info!(
                        "Album cache upgrade: '{}' -> '{}' ({})",
                        cached, album_display, key
                    );
                    let upgraded = album_display.to_string();
                    entries.insert(key, upgraded.clone());
                    upgraded
                } else {
                    cached
                }
            }
        }
    }

    /// Peek at the canonical name without inserting.
    pub async fn get(&self, artist: &str, album_display: &str) -> Option<String> {
        let key = self.key(artist, album_display);
        self.entries.lock().await.get(&key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// A candidate upgrades the cached name when the cached one is bare
    /// (equal to its own base form) and the candidate carries an edition
    /// qualifier. Richer-vs-richer comparisons are not ordered; the first
    /// qualified name to arrive wins and stays.
    fn is_upgrade(&self, cached: &str, candidate: &str) -> bool {
        !self.patterns.has_qualifier(cached) && self.patterns.has_qualifier(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cache() -> AlbumNameCache {
        let patterns = EditionPatterns::from_qualifiers(
            &crate::normalize::DEFAULT_EDITION_QUALIFIERS
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        )
        .unwrap();
        AlbumNameCache::new(Arc::new(patterns))
    }

    #[tokio::test]
    async fn test_first_sighting_caches() {
        let cache = make_cache();
        let name = cache.resolve("Radiohead", "In Rainbows").await;
        assert_eq!(name, "In Rainbows");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_upgrade_plain_then_deluxe() {
        let cache = make_cache();

        let first = cache.resolve("Radiohead", "In Rainbows").await;
        assert_eq!(first, "In Rainbows");

        let upgraded = cache
            .resolve("Radiohead", "In Rainbows (Deluxe Edition)")
            .await;
        assert_eq!(upgraded, "In Rainbows (Deluxe Edition)");

        // Later plain sightings now converge on the richer name
        let converged = cache.resolve("Radiohead", "In Rainbows").await;
        assert_eq!(converged, "In Rainbows (Deluxe Edition)");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_convergence_deluxe_then_plain() {
        // Same convergence, opposite processing order.
        let cache = make_cache();

        let first = cache
            .resolve("Radiohead", "In Rainbows (Deluxe Edition)")
            .await;
        assert_eq!(first, "In Rainbows (Deluxe Edition)");

        let second = cache.resolve("Radiohead", "In Rainbows").await;
        assert_eq!(second, "In Rainbows (Deluxe Edition)");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_stability_bias_between_qualified_names() {
        let cache = make_cache();

        let first = cache.resolve("Pink Floyd", "The Wall (Remastered)").await;
        assert_eq!(first, "The Wall (Remastered)");

        // Another qualified variant of the same base does not replace it
        let second = cache
            .resolve("Pink Floyd", "The Wall (Deluxe Edition)")
            .await;
        assert_eq!(second, "The Wall (Remastered)");
    }

    #[tokio::test]
    async fn test_distinct_artists_do_not_collide() {
        let cache = make_cache();

        cache.resolve("Artist One", "Greatest Hits").await;
        let other = cache.resolve("Artist Two", "Greatest Hits").await;
        assert_eq!(other, "Greatest Hits");
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_key_ignores_case_and_diacritics() {
        let cache = make_cache();

        cache.resolve("Beyoncé", "Lemonade").await;
        let resolved = cache.resolve("beyonce", "LEMONADE").await;
        // Same key: the first display form stays canonical
        assert_eq!(resolved, "Lemonade");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_does_not_insert() {
        let cache = make_cache();
        assert!(cache.get("Artist", "Album").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_single_winner() {
        // Two workers racing on the same key must agree on one name.
        let cache = Arc::new(make_cache());

        let a = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.resolve("Artist", "Album (Deluxe)").await })
        };
        let b = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.resolve("Artist", "Album").await })
        };

        let (got_a, got_b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(cache.len().await, 1);

        // Whichever order the lock granted, the final canonical name is
        // the qualified one and at least one caller saw it.
        let final_name = cache.resolve("Artist", "Album").await;
        assert_eq!(final_name, "Album (Deluxe)");
        assert!(got_a == "Album (Deluxe)" || got_b == "Album (Deluxe)");
    }
}
