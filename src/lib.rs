//! sonarr-ytdl - Fetch missing Sonarr episodes from video sites
//!
//! This library merges the series tracked in the configuration with the
//! Sonarr catalog, finds the episodes that aired but have no file yet,
//! searches the configured video source for each of them and downloads the
//! matches with yt-dlp into the series folder, asking Sonarr to rescan
//! afterwards.

pub mod catalog;
pub mod config;
pub mod episode_filter;
pub mod job_builder;
pub mod match_resolver;
pub mod naming;
pub mod orchestrator;
pub mod platform;
pub mod scheduler;
pub mod series_rules;

// Re-export the types needed to wire up a run
pub use catalog::{CatalogError, CatalogService, SonarrClient};
pub use config::{AppConfig, ConfigError};
pub use orchestrator::{Orchestrator, ProgressEvent, RunSummary};
pub use platform::{PlatformError, VideoPlatform, YtDlp};
pub use scheduler::Scheduler;

use thiserror::Error;

/// Top-level error type for fatal sonarr-ytdl failures
///
/// Only startup can fail fatally; errors during a run are logged and the
/// affected series or episode is skipped.
#[derive(Debug, Error)]
pub enum SonarrYtdlError {
    /// Error while loading the configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error while setting up the catalog client
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Error while setting up the video platform
    #[error("Video platform error: {0}")]
    Platform(#[from] PlatformError),
}
