//! Episode filtering
//!
//! Decides which episodes of a series still need to be fetched. Nothing is
//! remembered between runs; every run re-evaluates the full episode list.

use crate::catalog::CatalogEpisode;
use crate::series_rules::MergedSeries;
use chrono::{DateTime, Utc};

/// Computes the air date used for filtering.
///
/// The catalog air date shifted by the series offset, if any. Episodes
/// without an air date count as airing at `now`.
pub fn effective_air_date(
    series: &MergedSeries,
    episode: &CatalogEpisode,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match episode.air_date_utc {
        Some(aired) => series
            .offset
            .map(|offset| offset.apply(aired))
            .unwrap_or(aired),
        None => now,
    }
}

/// Returns whether an episode has to be fetched.
///
/// An episode is not needed when it is unmonitored, already has a file, or
/// its effective air date lies strictly after `now`.
pub fn is_needed(series: &MergedSeries, episode: &CatalogEpisode, now: DateTime<Utc>) -> bool {
    episode.monitored && !episode.has_file && effective_air_date(series, episode, now) <= now
}

/// Selects the needed episodes of a series
///
/// Needed episodes get their title rewritten with the series' catalog title
/// rule, producing the title used for remote matching. Other episodes are
/// dropped.
///
/// # Arguments
///
/// * `series` - The merged series the episodes belong to
/// * `episodes` - The full episode list of the series
/// * `now` - Start time of the current run
///
/// # Returns
///
/// The needed episodes in catalog order
pub fn needed_episodes(
    series: &MergedSeries,
    episodes: Vec<CatalogEpisode>,
    now: DateTime<Utc>,
) -> Vec<CatalogEpisode> {
    episodes
        .into_iter()
        .filter(|episode| is_needed(series, episode, now))
        .map(|mut episode| {
            if let Some(rewrite) = &series.catalog_title_rewrite {
                episode.title = rewrite.apply(&episode.title).into_owned();
            }
            episode
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogSeries;
    use crate::config::{AirDateOffset, TitleRewrite};
    use crate::series_rules::SubtitlePolicy;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn series() -> MergedSeries {
        MergedSeries {
            series: CatalogSeries {
                id: 1,
                title: "Example Show".to_string(),
                monitored: true,
                path: "/tv/Example Show".to_string(),
                season_count: 1,
                episode_count: 4,
                year: None,
            },
            url: "https://example.com/playlist".to_string(),
            catalog_title_rewrite: None,
            remote_title_rewrite: None,
            offset: None,
            cookies_file: None,
            format: None,
            playlist_reverse: true,
            subtitles: SubtitlePolicy::default(),
        }
    }

    fn episode(id: u64, title: &str, aired: Option<DateTime<Utc>>) -> CatalogEpisode {
        CatalogEpisode {
            id,
            series_id: 1,
            season_number: 1,
            episode_number: id as u32,
            title: title.to_string(),
            monitored: true,
            has_file: false,
            air_date_utc: aired,
        }
    }

    #[test]
    fn test_file_or_unmonitored_always_excluded() {
        let series = series();
        let long_ago = Some(now() - TimeDelta::days(365));

        let mut with_file = episode(1, "A", long_ago);
        with_file.has_file = true;
        let mut unmonitored = episode(2, "B", long_ago);
        unmonitored.monitored = false;
        let mut unmonitored_future = episode(3, "C", Some(now() + TimeDelta::days(1)));
        unmonitored_future.monitored = false;

        let needed = needed_episodes(&series, vec![with_file, unmonitored, unmonitored_future], now());
        assert!(needed.is_empty());
    }

    #[test]
    fn test_air_date_boundary_is_inclusive() {
        let series = series();
        let exactly_now = episode(1, "Now", Some(now()));
        let one_second_later = episode(2, "Later", Some(now() + TimeDelta::seconds(1)));
        let yesterday = episode(3, "Yesterday", Some(now() - TimeDelta::days(1)));

        let needed = needed_episodes(&series, vec![exactly_now, one_second_later, yesterday], now());
        let ids: Vec<u64> = needed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_missing_air_date_counts_as_aired() {
        assert!(is_needed(&series(), &episode(1, "Unknown", None), now()));
    }

    #[test]
    fn test_forward_offset_excludes_todays_episode() {
        let series = MergedSeries {
            offset: Some(AirDateOffset::new(TimeDelta::days(7))),
            ..series()
        };
        let today = episode(1, "Today", Some(now() - TimeDelta::hours(1)));
        assert_eq!(
            effective_air_date(&series, &today, now()),
            now() + TimeDelta::days(7) - TimeDelta::hours(1)
        );
        assert!(needed_episodes(&series, vec![today], now()).is_empty());
    }

    #[test]
    fn test_backward_offset_includes_future_episode() {
        let series = MergedSeries {
            offset: Some(AirDateOffset::new(TimeDelta::days(-2))),
            ..series()
        };
        let tomorrow = episode(1, "Tomorrow", Some(now() + TimeDelta::days(1)));
        assert_eq!(needed_episodes(&series, vec![tomorrow], now()).len(), 1);
    }

    #[test]
    fn test_title_rewrite_applied_to_needed_episodes() {
        let series = MergedSeries {
            catalog_title_rewrite: Some(TitleRewrite::new(r" \(Part \d\)", "").unwrap()),
            ..series()
        };
        let needed = needed_episodes(
            &series,
            vec![
                episode(1, "The Heist (Part 1) (Part 2)", None),
                episode(2, "No Parts Here", None),
            ],
            now(),
        );
        assert_eq!(needed[0].title, "The Heist (Part 2)");
        assert_eq!(needed[1].title, "No Parts Here");
    }

    #[test]
    fn test_titles_unchanged_without_rule() {
        let needed = needed_episodes(&series(), vec![episode(1, "Pilot: Part #1", None)], now());
        assert_eq!(needed[0].title, "Pilot: Part #1");
    }
}
