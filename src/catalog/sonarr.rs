/// Sonarr catalog service implementation.
use super::sonarr_types::{SonarrCommand, SonarrEpisode, SonarrNamingConfig, SonarrSeries};
use super::{CatalogEpisode, CatalogError, CatalogSeries, CatalogService, NamingConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Timeout applied to every call against the Sonarr API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sonarr API flavour, selecting the path prefix of every endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    /// Unversioned `api` prefix (Sonarr v2 and compatible)
    #[default]
    Legacy,
    /// `api/v3` prefix used by Sonarr v3 and v4
    V3,
}

impl ApiVersion {
    /// Maps the configured version selector to an API flavour.
    ///
    /// `v3` and `v4` (case-insensitive) select the versioned API, anything
    /// else falls back to the legacy prefix.
    pub fn from_selector(selector: &str) -> Self {
        match selector.trim().to_lowercase().as_str() {
            "v3" | "v4" => ApiVersion::V3,
            _ => ApiVersion::Legacy,
        }
    }

    /// Returns the path prefix for this API flavour.
    pub fn path(&self) -> &'static str {
        match self {
            ApiVersion::Legacy => "api",
            ApiVersion::V3 => "api/v3",
        }
    }
}

/// Connection settings for a Sonarr instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SonarrConnection {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub api_key: String,
    pub version: ApiVersion,
    /// Optional URL base when Sonarr runs behind a reverse proxy sub path
    pub base_dir: Option<String>,
}

impl SonarrConnection {
    /// Builds the base URL (`scheme://host:port/basedir`) without API prefix.
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        let base_dir = self
            .base_dir
            .as_deref()
            .map(|dir| dir.trim_matches('/'))
            .filter(|dir| !dir.is_empty())
            .map(|dir| format!("/{}", dir))
            .unwrap_or_default();

        format!("{}://{}:{}{}", scheme, self.host, self.port, base_dir)
    }
}

/// Catalog service backed by the Sonarr HTTP API.
///
/// Uses a blocking HTTP client with a fixed timeout. The API key is sent as
/// the `apikey` query parameter on every request.
pub struct SonarrClient {
    client: reqwest::blocking::Client,
    api_url: String,
    api_key: String,
}

impl SonarrClient {
    /// Creates a new client for the given Sonarr connection.
    pub fn new(connection: &SonarrConnection) -> Result<Self, CatalogError> {
        let api_url = format!("{}/{}", connection.base_url(), connection.version.path());

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CatalogError::Connection {
                url: api_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_url,
            api_key: connection.api_key.clone(),
        })
    }

    /// Returns the full URL of an API resource.
    fn endpoint(&self, resource: &str) -> String {
        format!("{}/{}", self.api_url, resource)
    }

    /// Performs a GET request and decodes the JSON body.
    fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let url = self.endpoint(resource);
        debug!(%url, ?params, "GET");

        let response = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(params)
            .send()
            .map_err(|e| classify_error(&url, e))?;

        let response = ensure_success(&url, response)?;

        response.json().map_err(|e| CatalogError::Decode {
            url,
            message: e.to_string(),
        })
    }

    /// Performs a POST request with a JSON body, ignoring the response body.
    fn post<B: Serialize>(&self, resource: &str, body: &B) -> Result<(), CatalogError> {
        let url = self.endpoint(resource);
        debug!(%url, "POST");

        let response = self
            .client
            .post(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .json(body)
            .send()
            .map_err(|e| classify_error(&url, e))?;

        let response = ensure_success(&url, response)?;
        debug!(%url, status = response.status().as_u16(), "POST succeeded");

        Ok(())
    }

    fn convert_series(series: SonarrSeries) -> CatalogSeries {
        let (season_count, episode_count) = match series.statistics {
            Some(stats) => (stats.season_count, stats.episode_count),
            None => (
                series.season_count.unwrap_or_default(),
                series.episode_count.unwrap_or_default(),
            ),
        };

        CatalogSeries {
            id: series.id,
            title: series.title,
            monitored: series.monitored,
            path: series.path,
            season_count,
            episode_count,
            year: Some(series.year).filter(|year| *year > 0),
        }
    }

    fn convert_episode(episode: SonarrEpisode) -> CatalogEpisode {
        CatalogEpisode {
            id: episode.id,
            series_id: episode.series_id,
            season_number: episode.season_number,
            episode_number: episode.episode_number,
            title: episode.title.unwrap_or_default(),
            monitored: episode.monitored,
            has_file: episode.has_file,
            air_date_utc: episode.air_date_utc,
        }
    }
}

impl CatalogService for SonarrClient {
    fn list_series(&self) -> Result<Vec<CatalogSeries>, CatalogError> {
        let series: Vec<SonarrSeries> = self.get("series", &[])?;
        Ok(series.into_iter().map(Self::convert_series).collect())
    }

    fn naming_config(&self) -> Result<NamingConfig, CatalogError> {
        let naming: SonarrNamingConfig = self.get("config/naming", &[])?;
        Ok(NamingConfig {
            season_folder_format: naming.season_folder_format,
            standard_episode_format: naming.standard_episode_format,
            specials_folder_format: naming.specials_folder_format,
        })
    }

    fn list_episodes(&self, series_id: u64) -> Result<Vec<CatalogEpisode>, CatalogError> {
        let episodes: Vec<SonarrEpisode> =
            self.get("episode", &[("seriesId", series_id.to_string())])?;
        Ok(episodes.into_iter().map(Self::convert_episode).collect())
    }

    fn request_rescan(&self, series_id: u64) -> Result<(), CatalogError> {
        self.post(
            "command",
            &SonarrCommand {
                name: "RescanSeries",
                series_id,
            },
        )
    }
}

/// Sorts a transport error into the closed set of catalog error kinds.
fn classify_error(url: &str, error: reqwest::Error) -> CatalogError {
    let url = url.to_string();
    if error.is_timeout() {
        CatalogError::Timeout { url }
    } else if error.is_decode() {
        CatalogError::Decode {
            url,
            message: error.to_string(),
        }
    } else {
        CatalogError::Connection {
            url,
            message: error.to_string(),
        }
    }
}

/// Turns non-2xx responses into a status error carrying the response body.
fn ensure_success(
    url: &str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(CatalogError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}
