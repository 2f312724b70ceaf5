/// Sonarr API response types for deserialization.
///
/// These structures mirror the JSON shapes returned by both the legacy `api`
/// and the `api/v3` endpoints.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A series from the `series` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SonarrSeries {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub path: String,
    /// 0 when unknown
    #[serde(default)]
    pub year: u32,
    /// Legacy API only
    pub season_count: Option<usize>,
    /// Legacy API only
    pub episode_count: Option<usize>,
    /// v3 API only
    pub statistics: Option<SonarrSeriesStatistics>,
}

/// Per-series counters of the v3 API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SonarrSeriesStatistics {
    #[serde(default)]
    pub season_count: usize,
    #[serde(default)]
    pub episode_count: usize,
}

/// An episode from the `episode` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SonarrEpisode {
    pub id: u64,
    pub series_id: u64,
    pub season_number: u32,
    pub episode_number: u32,
    /// May be missing for announced but untitled episodes
    pub title: Option<String>,
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub has_file: bool,
    pub air_date_utc: Option<DateTime<Utc>>,
}

/// The `config/naming` resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SonarrNamingConfig {
    pub season_folder_format: String,
    pub standard_episode_format: String,
    pub specials_folder_format: Option<String>,
}

/// Body of a `command` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SonarrCommand<'a> {
    pub name: &'a str,
    pub series_id: u64,
}
