//! Catalog service access.
//!
//! The catalog is the episode-tracking backend (Sonarr) that owns the
//! canonical series and episode state and the file naming configuration.
//! This module defines the domain types handed to the rest of the engine and
//! the trait every catalog backend implements.
mod sonarr;
mod sonarr_types;

pub use sonarr::{ApiVersion, SonarrClient, SonarrConnection};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur while talking to the catalog service.
///
/// Every variant carries the URL of the failed call. The client never retries;
/// callers decide whether to skip the affected series or give up.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The request did not complete within the client timeout
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The connection could not be established or broke off
    #[error("Connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// The service answered with a non-2xx status
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// A series as known to the catalog service.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSeries {
    /// Catalog identifier
    pub id: u64,
    /// Series title, matched exactly against the tracked series configuration
    pub title: String,
    /// Whether the catalog is monitoring the series
    pub monitored: bool,
    /// Series folder on the catalog's file system
    pub path: String,
    /// Number of seasons known to the catalog
    pub season_count: usize,
    /// Number of episodes known to the catalog
    pub episode_count: usize,
    /// First air year, if known
    pub year: Option<u32>,
}

/// A single episode as known to the catalog service.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEpisode {
    pub id: u64,
    pub series_id: u64,
    /// Season number (0 for specials)
    pub season_number: u32,
    pub episode_number: u32,
    pub title: String,
    pub monitored: bool,
    pub has_file: bool,
    /// Original air date. Episodes without one are treated as already aired.
    pub air_date_utc: Option<DateTime<Utc>>,
}

/// File naming templates configured in the catalog service.
///
/// The templates use the catalog's own token syntax, e.g.
/// `{Series Title} - S{season:00}E{episode:00} - {Episode Title}`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamingConfig {
    pub season_folder_format: String,
    pub standard_episode_format: String,
    /// Folder used for season 0, if the catalog defines one
    pub specials_folder_format: Option<String>,
}

/// Trait for catalog services holding the wanted series and episodes.
///
/// All calls are synchronous and single-attempt. Failures are returned to the
/// caller unchanged, never swallowed here.
pub trait CatalogService {
    /// Lists every series in the catalog.
    fn list_series(&self) -> Result<Vec<CatalogSeries>, CatalogError>;

    /// Fetches the file naming configuration.
    fn naming_config(&self) -> Result<NamingConfig, CatalogError>;

    /// Lists all episodes of the given series.
    ///
    /// # Arguments
    ///
    /// * `series_id` - Catalog identifier of the series
    fn list_episodes(&self, series_id: u64) -> Result<Vec<CatalogEpisode>, CatalogError>;

    /// Asks the catalog to rescan the series folder on disk.
    fn request_rescan(&self, series_id: u64) -> Result<(), CatalogError>;
}
