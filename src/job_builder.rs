//! Download job construction
//!
//! Assembles everything the video platform needs to fetch and postprocess a
//! single episode. The result is a plain value: executing it requires no
//! further lookups.

use crate::catalog::{CatalogEpisode, NamingConfig};
use crate::config::DownloadSettings;
use crate::naming::episode_output_template;
use crate::series_rules::{MergedSeries, SubtitlePolicy};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Container every download is remuxed into
pub const OUTPUT_CONTAINER: &str = "mkv";

/// Text format subtitles are converted to before embedding
pub const SUBTITLE_FORMAT: &str = "srt";

/// A postprocessing step executed after the raw fetch, in list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessor {
    /// Remux the video into another container without re-encoding
    RemuxVideo { container: String },
    /// Convert downloaded subtitles to a text format
    ConvertSubtitles { format: String },
    /// Embed subtitles into the video container
    EmbedSubtitles,
}

impl fmt::Display for PostProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostProcessor::RemuxVideo { container } => write!(f, "remux-to-{}", container),
            PostProcessor::ConvertSubtitles { format } => write!(f, "convert-subs-to-{}", format),
            PostProcessor::EmbedSubtitles => write!(f, "embed-subs"),
        }
    }
}

/// Subtitle download options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleOptions {
    pub languages: Vec<String>,
    pub auto_generated: bool,
}

/// Retry and rate limiting knobs, in seconds where applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries per request, `None` keeps the downloader default
    pub retries: Option<u32>,
    /// Pause between retries
    pub retry_sleep_secs: u32,
    /// Pause before each download
    pub sleep_interval_secs: Option<u32>,
    /// Pause between requests during extraction
    pub sleep_requests_secs: Option<u32>,
}

/// Fully resolved parameters to fetch and postprocess one episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJobSpec {
    /// Remote video to fetch
    pub url: String,
    /// Destination with deferred extension, see [`crate::naming`]
    pub output_template: String,
    /// Format selector
    pub format: String,
    /// Container used when merging separate video and audio streams
    pub merge_output_format: String,
    /// Never expand the URL into a playlist
    pub no_playlist: bool,
    /// Continue on per-item errors
    pub ignore_errors: bool,
    /// Emit line based progress output
    pub report_progress: bool,
    pub cookie_file: Option<PathBuf>,
    pub subtitles: Option<SubtitleOptions>,
    pub post_processors: Vec<PostProcessor>,
    pub retry: RetryPolicy,
}

/// Builder producing a [`DownloadJobSpec`].
///
/// Starts from the base option set and applies optional steps. Every step
/// is total: a step that cannot apply leaves the options unchanged.
#[derive(Debug)]
pub struct DownloadJobBuilder {
    spec: DownloadJobSpec,
}

impl DownloadJobBuilder {
    /// Creates a builder with the base options: single item fetch,
    /// error tolerant, remux into [`OUTPUT_CONTAINER`], progress reporting.
    pub fn new(url: &str, output_template: String, default_format: &str) -> Self {
        Self {
            spec: DownloadJobSpec {
                url: url.to_string(),
                output_template,
                format: default_format.to_string(),
                merge_output_format: OUTPUT_CONTAINER.to_string(),
                no_playlist: true,
                ignore_errors: true,
                report_progress: true,
                cookie_file: None,
                subtitles: None,
                post_processors: vec![PostProcessor::RemuxVideo {
                    container: OUTPUT_CONTAINER.to_string(),
                }],
                retry: RetryPolicy {
                    retries: None,
                    retry_sleep_secs: 5,
                    sleep_interval_secs: None,
                    sleep_requests_secs: None,
                },
            },
        }
    }

    /// Uses the cookie file if it exists on disk, otherwise logs a warning.
    pub fn cookie_file(mut self, path: Option<&Path>) -> Self {
        if let Some(path) = path {
            if path.is_file() {
                debug!(path = %path.display(), "Cookies file used");
                self.spec.cookie_file = Some(path.to_path_buf());
            } else {
                warn!(path = %path.display(), "Cookies file specified but doesn't exist");
            }
        }
        self
    }

    /// Replaces the format selector.
    pub fn custom_format(mut self, format: Option<&str>) -> Self {
        if let Some(format) = format {
            self.spec.format = format.to_string();
        }
        self
    }

    /// Requests subtitles when the policy enables them.
    ///
    /// Adds rate limiting, a bounded retry count and the conversion and
    /// embedding postprocessing steps, in that order.
    pub fn subtitles(mut self, policy: &SubtitlePolicy) -> Self {
        if !policy.enabled {
            return self;
        }

        self.spec.subtitles = Some(SubtitleOptions {
            languages: policy.languages.clone(),
            auto_generated: policy.auto_generated,
        });
        self.spec.retry.sleep_interval_secs = Some(2);
        self.spec.retry.sleep_requests_secs = Some(3);
        self.spec.retry.retries = Some(10);
        self.spec.post_processors.push(PostProcessor::ConvertSubtitles {
            format: SUBTITLE_FORMAT.to_string(),
        });
        self.spec.post_processors.push(PostProcessor::EmbedSubtitles);
        self
    }

    pub fn build(self) -> DownloadJobSpec {
        self.spec
    }
}

/// Builds the download job for an episode
///
/// Applies, in order: cookie file, custom format, subtitles.
///
/// # Arguments
///
/// * `series` - The merged series rules
/// * `episode` - The needed episode (title already rewritten)
/// * `url` - The resolved remote video URL
/// * `settings` - Download defaults
/// * `naming` - Catalog naming configuration, if available
pub fn build_download_job(
    series: &MergedSeries,
    episode: &CatalogEpisode,
    url: &str,
    settings: &DownloadSettings,
    naming: Option<&NamingConfig>,
) -> DownloadJobSpec {
    let output_template =
        episode_output_template(naming, &settings.library_root, &series.series, episode);
    let cookie_file = cookie_path(settings, series);

    let job = DownloadJobBuilder::new(url, output_template, &settings.default_format)
        .cookie_file(cookie_file.as_deref())
        .custom_format(series.format.as_deref())
        .subtitles(&series.subtitles)
        .build();

    debug!(?job, "Download options");
    job
}

/// Resolves the configured cookie file of a series against the cookie directory.
pub fn cookie_path(settings: &DownloadSettings, series: &MergedSeries) -> Option<PathBuf> {
    series
        .cookies_file
        .as_ref()
        .map(|name| settings.cookie_dir.join(name))
}
