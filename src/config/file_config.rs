//! TOML file configuration.
//!
//! Every field is optional; file values override CLI values where present.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub music_root: Option<String>,
    pub staging_dir: Option<String>,
    pub port: Option<u16>,
    pub catalog_url: Option<String>,
    pub catalog_timeout_sec: Option<u64>,
    pub transfer_url: Option<String>,
    pub transfer_timeout_sec: Option<u64>,

    pub organizer: Option<OrganizerConfig>,
    pub resolver: Option<ResolverConfig>,
    pub naming: Option<NamingConfig>,
}

/// `[organizer]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizerConfig {
    pub worker_count: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub fixed_backoff: Option<bool>,
    pub verify_recheck_ms: Option<u64>,
    pub verify_max_checks: Option<u32>,
    pub failure_flush_ms: Option<u64>,
    pub success_flush_ms: Option<u64>,
    pub auto_accept: Option<bool>,
}

/// `[resolver]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolverConfig {
    pub acceptance_threshold: Option<f64>,
    pub max_candidates: Option<usize>,
    pub catalog_max_concurrent_requests: Option<usize>,
}

/// `[naming]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamingConfig {
    pub max_component_len: Option<usize>,
    /// Edition-qualifier cores (regex fragments) used to compute base
    /// album names. Replaces the built-in list when set.
    pub edition_qualifiers: Option<Vec<String>>,
}

impl FileConfig {
    /// Load and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }
}
