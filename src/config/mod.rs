mod file_config;

pub use file_config::{FileConfig, NamingConfig, OrganizerConfig, ResolverConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that participate in config resolution. Mirrors the CLI
/// surface; TOML values override these where present.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub music_root: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub port: u16,
    pub catalog_url: Option<String>,
    pub catalog_timeout_sec: u64,
    pub transfer_url: Option<String>,
    pub transfer_timeout_sec: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            music_root: None,
            staging_dir: None,
            port: 7720,
            catalog_url: None,
            catalog_timeout_sec: 30,
            transfer_url: None,
            transfer_timeout_sec: 600,
        }
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the organized music library.
    pub music_root: PathBuf,
    /// Staging directory for in-flight transfers. Must live on the same
    /// filesystem as `music_root` so the final rename stays atomic.
    pub staging_dir: PathBuf,
    pub port: u16,
    pub catalog_url: String,
    pub catalog_timeout_sec: u64,
    pub transfer_url: String,
    pub transfer_timeout_sec: u64,

    pub organizer: OrganizerSettings,
    pub resolver: ResolverSettings,
    pub naming: NamingSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let music_root = file
            .music_root
            .map(PathBuf::from)
            .or_else(|| cli.music_root.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("music_root must be specified via --music-root or in config file")
            })?;

        if !music_root.exists() {
            bail!("Music root does not exist: {:?}", music_root);
        }
        if !music_root.is_dir() {
            bail!("music_root is not a directory: {:?}", music_root);
        }

        // Default staging under the music root keeps renames atomic
        let staging_dir = file
            .staging_dir
            .map(PathBuf::from)
            .or_else(|| cli.staging_dir.clone())
            .unwrap_or_else(|| music_root.join(".staging"));

        let catalog_url = file
            .catalog_url
            .or_else(|| cli.catalog_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("catalog_url must be specified via --catalog-url or in config file")
            })?;

        let transfer_url = file
            .transfer_url
            .or_else(|| cli.transfer_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "transfer_url must be specified via --transfer-url or in config file"
                )
            })?;

        let port = file.port.unwrap_or(cli.port);
        let catalog_timeout_sec = file.catalog_timeout_sec.unwrap_or(cli.catalog_timeout_sec);
        let transfer_timeout_sec = file
            .transfer_timeout_sec
            .unwrap_or(cli.transfer_timeout_sec);

        let org_file = file.organizer.unwrap_or_default();
        let organizer = OrganizerSettings {
            worker_count: org_file.worker_count.unwrap_or(4),
            queue_capacity: org_file.queue_capacity.unwrap_or(256),
            max_retries: org_file.max_retries.unwrap_or(3),
            initial_backoff_ms: org_file.initial_backoff_ms.unwrap_or(500),
            max_backoff_ms: org_file.max_backoff_ms.unwrap_or(60_000),
            backoff_multiplier: org_file.backoff_multiplier.unwrap_or(2.0),
            fixed_backoff: org_file.fixed_backoff.unwrap_or(false),
            verify_recheck_ms: org_file.verify_recheck_ms.unwrap_or(400),
            verify_max_checks: org_file.verify_max_checks.unwrap_or(8),
            failure_flush_ms: org_file.failure_flush_ms.unwrap_or(500),
            success_flush_ms: org_file.success_flush_ms.unwrap_or(2000),
            auto_accept: org_file.auto_accept.unwrap_or(true),
        };

        let res_file = file.resolver.unwrap_or_default();
        let resolver = ResolverSettings {
            acceptance_threshold: res_file
                .acceptance_threshold
                .unwrap_or(0.85)
                .clamp(0.0, 1.0),
            max_candidates: res_file.max_candidates.unwrap_or(5).max(1),
            catalog_max_concurrent_requests: res_file
                .catalog_max_concurrent_requests
                .unwrap_or(4)
                .max(1),
        };

        let naming_file = file.naming.unwrap_or_default();
        let naming = NamingSettings {
            max_component_len: naming_file.max_component_len.unwrap_or(120).max(8),
            edition_qualifiers: naming_file.edition_qualifiers.unwrap_or_else(|| {
                crate::normalize::DEFAULT_EDITION_QUALIFIERS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            }),
        };

        Ok(Self {
            music_root,
            staging_dir,
            port,
            catalog_url,
            catalog_timeout_sec,
            transfer_url,
            transfer_timeout_sec,
            organizer,
            resolver,
            naming,
        })
    }
}

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct OrganizerSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub fixed_backoff: bool,
    /// Interval between file-size probes in Verifying.
    pub verify_recheck_ms: u64,
    /// Probes before verification gives up.
    pub verify_max_checks: u32,
    /// Collection window for failure reports.
    pub failure_flush_ms: u64,
    /// Collection window for success reports.
    pub success_flush_ms: u64,
    /// Auto-accept the top candidate above the acceptance threshold.
    pub auto_accept: bool,
}

impl Default for OrganizerSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 256,
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            fixed_backoff: false,
            verify_recheck_ms: 400,
            verify_max_checks: 8,
            failure_flush_ms: 500,
            success_flush_ms: 2000,
            auto_accept: true,
        }
    }
}

/// Metadata resolver tunables.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Score above which the top candidate is auto-accepted and further
    /// strategies are skipped.
    pub acceptance_threshold: f64,
    /// Candidate list cap.
    pub max_candidates: usize,
    /// Concurrent-request ceiling toward the catalog.
    pub catalog_max_concurrent_requests: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.85,
            max_candidates: 5,
            catalog_max_concurrent_requests: 4,
        }
    }
}

/// Naming and sanitization tunables.
#[derive(Debug, Clone)]
pub struct NamingSettings {
    /// Maximum length of one path component, in characters.
    pub max_component_len: usize,
    /// Edition-qualifier cores for base-album-name computation.
    pub edition_qualifiers: Vec<String>,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            max_component_len: 120,
            edition_qualifiers: crate::normalize::DEFAULT_EDITION_QUALIFIERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
