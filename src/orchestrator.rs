//! Download run orchestration
//!
//! One run takes a catalog snapshot, merges it with the tracked series,
//! filters the needed episodes and then processes them one at a time:
//! match, build, fetch, rescan. A failing episode never stops the run.

use crate::catalog::{CatalogEpisode, CatalogService, NamingConfig};
use crate::config::{DownloadSettings, TrackedSeriesConfig};
use crate::episode_filter::needed_episodes;
use crate::job_builder::{build_download_job, cookie_path};
use crate::match_resolver::{MatchQuery, resolve_match};
use crate::platform::VideoPlatform;
use crate::series_rules::{MergedSeries, merge_series};
use chrono::{DateTime, Utc};
use tracing::{debug, error};

/// Progress event emitted during a run
///
/// These events allow callers to track a run, render status lines, or
/// ignore them entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Run started
    Started { at: DateTime<Utc> },

    /// Catalog snapshot merged with the tracked series
    SeriesMerged { catalog_count: usize, active_count: usize },

    /// Episodes of a series filtered
    EpisodesFiltered { series_title: String, needed_count: usize },

    /// Searching the remote source for an episode
    SearchingEpisode {
        index: usize,
        total: usize,
        series_title: String,
        season_number: u32,
        episode_number: u32,
        episode_title: String,
    },

    /// No remote video matched the episode
    EpisodeMissing {
        series_title: String,
        season_number: u32,
        episode_number: u32,
    },

    /// Fetching a matched video
    Downloading { url: String, output_template: String },

    /// Episode fetched successfully
    Downloaded {
        series_title: String,
        season_number: u32,
        episode_number: u32,
    },

    /// Fetching failed, the episode is retried on the next run
    DownloadFailed {
        series_title: String,
        season_number: u32,
        episode_number: u32,
        reason: String,
    },

    /// Run complete
    Complete { summary: RunSummary },
}

/// Counters describing a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Needed episodes across all active series
    pub needed: usize,
    /// Needed episodes without a remote match
    pub missing: usize,
    /// Episodes fetched successfully
    pub downloaded: usize,
    /// Episodes whose fetch failed
    pub failed: usize,
}

/// Drives download runs against a catalog and a video platform.
pub struct Orchestrator<C, P> {
    catalog: C,
    platform: P,
    tracked: Vec<TrackedSeriesConfig>,
    settings: DownloadSettings,
    naming: Option<NamingConfig>,
}

impl<C, P> Orchestrator<C, P>
where
    C: CatalogService,
    P: VideoPlatform,
{
    /// Creates an orchestrator
    ///
    /// # Arguments
    ///
    /// * `catalog` - The catalog holding the wanted episodes
    /// * `platform` - The video platform to search and fetch from
    /// * `tracked` - The configured series
    /// * `settings` - Download defaults
    /// * `naming` - Catalog naming configuration, `None` selects the default pattern
    pub fn new(
        catalog: C,
        platform: P,
        tracked: Vec<TrackedSeriesConfig>,
        settings: DownloadSettings,
        naming: Option<NamingConfig>,
    ) -> Self {
        Self {
            catalog,
            platform,
            tracked,
            settings,
            naming,
        }
    }

    /// Executes one complete run
    ///
    /// Progress events are emitted through the provided callback. Every
    /// per-series and per-episode failure is logged and skipped; a run
    /// always completes.
    ///
    /// # Arguments
    ///
    /// * `now` - Start time of the run, used to judge air dates
    /// * `progress_callback` - Closure called with progress events
    ///
    /// # Returns
    ///
    /// Counters for the finished run
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let summary = orchestrator.run(Utc::now(), |event| {
    ///     if let ProgressEvent::Downloaded { series_title, .. } = event {
    ///         println!("Fetched an episode of {}", series_title);
    ///     }
    /// });
    /// ```
    pub fn run<F>(&self, now: DateTime<Utc>, mut progress_callback: F) -> RunSummary
    where
        F: FnMut(ProgressEvent),
    {
        progress_callback(ProgressEvent::Started { at: now });

        let active = self.collect_work(now, &mut progress_callback);
        let total: usize = active.iter().map(|(_, episodes)| episodes.len()).sum();
        let mut summary = RunSummary {
            needed: total,
            ..RunSummary::default()
        };

        if total == 0 {
            debug!("Nothing to download");
            progress_callback(ProgressEvent::Complete { summary });
            return summary;
        }

        let mut index = 0;
        for (series, episodes) in &active {
            for episode in episodes.iter().filter(|e| e.series_id == series.id()) {
                progress_callback(ProgressEvent::SearchingEpisode {
                    index,
                    total,
                    series_title: series.title().to_string(),
                    season_number: episode.season_number,
                    episode_number: episode.episode_number,
                    episode_title: episode.title.clone(),
                });
                index += 1;

                self.process_episode(series, episode, &mut summary, &mut progress_callback);
            }
        }

        debug!(
            needed = summary.needed,
            downloaded = summary.downloaded,
            missing = summary.missing,
            failed = summary.failed,
            "Run complete"
        );
        progress_callback(ProgressEvent::Complete { summary });
        summary
    }

    /// Merges the catalog with the tracked series and filters each series'
    /// episodes. Series without needed episodes are dropped.
    fn collect_work<F>(
        &self,
        now: DateTime<Utc>,
        progress_callback: &mut F,
    ) -> Vec<(MergedSeries, Vec<CatalogEpisode>)>
    where
        F: FnMut(ProgressEvent),
    {
        let catalog = match self.catalog.list_series() {
            Ok(series) => series,
            Err(e) => {
                error!(error = %e, "Failed to list catalog series");
                Vec::new()
            }
        };
        let catalog_count = catalog.len();

        let merged = merge_series(catalog, &self.tracked);
        progress_callback(ProgressEvent::SeriesMerged {
            catalog_count,
            active_count: merged.len(),
        });

        let mut active = Vec::new();
        for series in merged {
            let episodes = match self.catalog.list_episodes(series.id()) {
                Ok(episodes) => episodes,
                Err(e) => {
                    error!(series = %series.title(), error = %e, "Failed to list episodes");
                    continue;
                }
            };

            let needed = needed_episodes(&series, episodes, now);
            progress_callback(ProgressEvent::EpisodesFiltered {
                series_title: series.title().to_string(),
                needed_count: needed.len(),
            });

            if needed.is_empty() {
                debug!(series = %series.title(), "No episodes needed");
                continue;
            }
            active.push((series, needed));
        }

        active
    }

    /// Matches, fetches and signals a rescan for one episode.
    fn process_episode<F>(
        &self,
        series: &MergedSeries,
        episode: &CatalogEpisode,
        summary: &mut RunSummary,
        progress_callback: &mut F,
    ) where
        F: FnMut(ProgressEvent),
    {
        debug!(
            series = %series.title(),
            season = episode.season_number,
            episode = episode.episode_number,
            title = %episode.title,
            "Processing episode"
        );

        let query = MatchQuery {
            title: &episode.title,
            source_url: &series.url,
            reverse: series.playlist_reverse,
            cookie_file: cookie_path(&self.settings, series).filter(|path| path.is_file()),
            remote_title_rewrite: series.remote_title_rewrite.as_ref(),
        };

        let Some(url) = resolve_match(&self.platform, &query).url else {
            debug!(
                series = %series.title(),
                season = episode.season_number,
                episode = episode.episode_number,
                "Episode missing from source"
            );
            summary.missing += 1;
            progress_callback(ProgressEvent::EpisodeMissing {
                series_title: series.title().to_string(),
                season_number: episode.season_number,
                episode_number: episode.episode_number,
            });
            return;
        };
        debug!(url = %url, "Found matching video");

        let job = build_download_job(series, episode, &url, &self.settings, self.naming.as_ref());
        progress_callback(ProgressEvent::Downloading {
            url: job.url.clone(),
            output_template: job.output_template.clone(),
        });

        if let Err(e) = self.platform.fetch(&job) {
            error!(
                series = %series.title(),
                season = episode.season_number,
                episode = episode.episode_number,
                error = %e,
                "Failed to fetch episode"
            );
            summary.failed += 1;
            progress_callback(ProgressEvent::DownloadFailed {
                series_title: series.title().to_string(),
                season_number: episode.season_number,
                episode_number: episode.episode_number,
                reason: e.to_string(),
            });
            return;
        }

        summary.downloaded += 1;
        progress_callback(ProgressEvent::Downloaded {
            series_title: series.title().to_string(),
            season_number: episode.season_number,
            episode_number: episode.episode_number,
        });

        // Rescan failures leave the download counted as successful
        match self.catalog.request_rescan(series.id()) {
            Ok(()) => debug!(series = %series.title(), "Rescan requested"),
            Err(e) => error!(series = %series.title(), error = %e, "Failed to request rescan"),
        }
    }
}
