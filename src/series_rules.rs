//! Series rule merging
//!
//! Joins the catalog's series with the tracked series configuration. Only
//! series present in both end up in a run; each carries its effective
//! per-series rules with defaults filled in.

use crate::catalog::CatalogSeries;
use crate::config::{AirDateOffset, TitleRewrite, TrackedSeriesConfig};
use tracing::warn;

/// Effective subtitle handling of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitlePolicy {
    pub enabled: bool,
    pub languages: Vec<String>,
    /// Also accept automatically generated subtitles
    pub auto_generated: bool,
}

impl Default for SubtitlePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            languages: vec!["en".to_string()],
            auto_generated: false,
        }
    }
}

/// A catalog series enriched with its tracked configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSeries {
    pub series: CatalogSeries,
    /// Source to search for episodes
    pub url: String,
    /// Rewrite applied to catalog episode titles
    pub catalog_title_rewrite: Option<TitleRewrite>,
    /// Rewrite applied to remote video titles
    pub remote_title_rewrite: Option<TitleRewrite>,
    pub offset: Option<AirDateOffset>,
    pub cookies_file: Option<String>,
    /// Format selector replacing the default one
    pub format: Option<String>,
    /// Search oldest-first
    pub playlist_reverse: bool,
    pub subtitles: SubtitlePolicy,
}

impl MergedSeries {
    /// Enriches a catalog series with the given configuration.
    ///
    /// Defaults: subtitles off, languages `["en"]`, no auto-generated
    /// subtitles, oldest-first search.
    pub fn new(series: CatalogSeries, config: &TrackedSeriesConfig) -> Self {
        let mut subtitles = SubtitlePolicy::default();
        if let Some(section) = &config.subtitles {
            subtitles.enabled = section.enabled.unwrap_or(true);
            if let Some(languages) = &section.languages {
                subtitles.languages = languages.clone();
            }
            if let Some(auto_generated) = section.autogenerated {
                subtitles.auto_generated = auto_generated;
            }
        }

        Self {
            series,
            url: config.url.clone(),
            catalog_title_rewrite: config.regex.sonarr.clone(),
            remote_title_rewrite: config.regex.site.clone(),
            offset: config.offset,
            cookies_file: config.cookies_file.clone(),
            format: config.format.clone(),
            playlist_reverse: config.playlist_reverse.unwrap_or(true),
            subtitles,
        }
    }

    pub fn id(&self) -> u64 {
        self.series.id
    }

    pub fn title(&self) -> &str {
        &self.series.title
    }
}

/// Merges catalog series with the tracked configuration
///
/// The output keeps the catalog order. Catalog series without a tracked entry
/// are dropped, tracked entries without a catalog series are ignored (they
/// are simply not added to the catalog yet). Titles must match exactly.
///
/// # Arguments
///
/// * `catalog` - All series known to the catalog
/// * `tracked` - The configured series to fetch
///
/// # Returns
///
/// The matched series with their effective rules
pub fn merge_series(catalog: Vec<CatalogSeries>, tracked: &[TrackedSeriesConfig]) -> Vec<MergedSeries> {
    let merged: Vec<MergedSeries> = catalog
        .into_iter()
        .filter_map(|series| {
            tracked
                .iter()
                .find(|config| config.title == series.title)
                .map(|config| MergedSeries::new(series, config))
        })
        .collect();

    for series in merged.iter().filter(|s| !s.series.monitored) {
        warn!(series = %series.title(), "Series is not currently monitored");
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegexRules, SubtitleConfig};

    fn catalog_series(id: u64, title: &str) -> CatalogSeries {
        CatalogSeries {
            id,
            title: title.to_string(),
            monitored: true,
            path: format!("/tv/{}", title),
            season_count: 1,
            episode_count: 3,
            year: None,
        }
    }

    fn tracked(title: &str) -> TrackedSeriesConfig {
        TrackedSeriesConfig {
            title: title.to_string(),
            url: format!("https://example.com/{}", title.replace(' ', "")),
            regex: RegexRules::default(),
            offset: None,
            cookies_file: None,
            format: None,
            playlist_reverse: None,
            subtitles: None,
        }
    }

    #[test]
    fn test_only_matching_series_survive_in_catalog_order() {
        let catalog = vec![
            catalog_series(1, "Zeta"),
            catalog_series(2, "Alpha"),
            catalog_series(3, "Untracked"),
        ];
        let configs = vec![tracked("Alpha"), tracked("Zeta"), tracked("Not In Catalog")];

        let merged = merge_series(catalog, &configs);
        let ids: Vec<u64> = merged.iter().map(MergedSeries::id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(merged[1].url, "https://example.com/Alpha");
    }

    #[test]
    fn test_title_match_is_exact() {
        let merged = merge_series(vec![catalog_series(1, "example show")], &[tracked("Example Show")]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_defaults() {
        let merged = MergedSeries::new(catalog_series(1, "Alpha"), &tracked("Alpha"));
        assert_eq!(merged.subtitles, SubtitlePolicy::default());
        assert!(!merged.subtitles.enabled);
        assert_eq!(merged.subtitles.languages, vec!["en".to_string()]);
        assert!(merged.playlist_reverse);
        assert!(merged.format.is_none());
        assert!(merged.catalog_title_rewrite.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = TrackedSeriesConfig {
            regex: RegexRules {
                sonarr: Some(TitleRewrite::new("a", "b").unwrap()),
                site: Some(TitleRewrite::new("c", "d").unwrap()),
            },
            cookies_file: Some("cookies.txt".to_string()),
            format: Some("worst".to_string()),
            playlist_reverse: Some(false),
            subtitles: Some(SubtitleConfig {
                enabled: None,
                languages: Some(vec!["de".to_string()]),
                autogenerated: Some(true),
            }),
            ..tracked("Alpha")
        };

        let merged = MergedSeries::new(catalog_series(1, "Alpha"), &config);
        assert!(!merged.playlist_reverse);
        assert_eq!(merged.format.as_deref(), Some("worst"));
        assert_eq!(merged.cookies_file.as_deref(), Some("cookies.txt"));
        assert!(merged.subtitles.enabled);
        assert!(merged.subtitles.auto_generated);
        assert_eq!(merged.subtitles.languages, vec!["de".to_string()]);
        assert_eq!(merged.catalog_title_rewrite, config.regex.sonarr);
        assert_eq!(merged.remote_title_rewrite, config.regex.site);
    }

    #[test]
    fn test_subtitles_explicitly_disabled() {
        let config = TrackedSeriesConfig {
            subtitles: Some(SubtitleConfig {
                enabled: Some(false),
                ..SubtitleConfig::default()
            }),
            ..tracked("Alpha")
        };
        let merged = MergedSeries::new(catalog_series(1, "Alpha"), &config);
        assert!(!merged.subtitles.enabled);
    }

    #[test]
    fn test_unmonitored_series_is_kept() {
        let mut series = catalog_series(1, "Alpha");
        series.monitored = false;
        let merged = merge_series(vec![series], &[tracked("Alpha")]);
        assert_eq!(merged.len(), 1);
    }
}
