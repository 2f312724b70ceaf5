//! Configuration file loading
//!
//! The configuration is a YAML file read once at startup. It holds the scan
//! interval, the Sonarr connection, download defaults and the list of tracked
//! series with their per-series override rules. Every problem found here is
//! fatal: the process refuses to start with a partial configuration.

use crate::catalog::{ApiVersion, SonarrConnection};
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Scan interval used when the configuration does not set one
pub const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 60;

/// Longest accepted scan interval, one year
pub const MAX_SCAN_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Prefix prepended to the catalog's series paths when none is configured
pub const DEFAULT_LIBRARY_ROOT: &str = "/sonarr_root";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine a default configuration location
    #[error("Failed to determine configuration directory location")]
    ConfigDirectoryNotFound,

    /// Failed to read the configuration file
    #[error("Failed to read configuration file {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    /// The file is not valid YAML or a required section is missing or malformed
    #[error("Invalid configuration file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A value is syntactically fine but not acceptable
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// The same series title is tracked more than once
    #[error("Series '{0}' is configured more than once")]
    DuplicateSeries(String),
}

/// Fully validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Minutes between two scans
    pub scan_interval_minutes: u64,
    /// Whether debug logging was requested in the configuration file
    pub debug: bool,
    pub sonarr: SonarrConnection,
    pub download: DownloadSettings,
    pub series: Vec<TrackedSeriesConfig>,
}

/// Settings shared by every download job.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    /// yt-dlp format selector used unless a series overrides it
    pub default_format: String,
    /// Prefix prepended to the catalog's series path
    pub library_root: String,
    /// Directory that relative cookie file names are resolved against
    pub cookie_dir: PathBuf,
}

/// An operator-supplied series to fetch, with its override rules.
///
/// Matched against the catalog by exact title equality.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackedSeriesConfig {
    pub title: String,
    /// Video, playlist or channel URL to search for episodes
    pub url: String,
    #[serde(default)]
    pub regex: RegexRules,
    #[serde(default)]
    pub offset: Option<AirDateOffset>,
    /// Cookie file name, relative to the configuration directory
    #[serde(default)]
    pub cookies_file: Option<String>,
    /// Custom yt-dlp format selector
    #[serde(default)]
    pub format: Option<String>,
    /// Search the source oldest-first (the default) or newest-first
    #[serde(default, rename = "playlistreverse", deserialize_with = "flexible_opt_bool")]
    pub playlist_reverse: Option<bool>,
    #[serde(default, deserialize_with = "present_section")]
    pub subtitles: Option<SubtitleConfig>,
}

/// Title rewrite rules of a tracked series.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegexRules {
    /// Applied to catalog episode titles before searching
    #[serde(default)]
    pub sonarr: Option<TitleRewrite>,
    /// Applied to remote video titles before matching
    #[serde(default)]
    pub site: Option<TitleRewrite>,
}

/// Subtitle settings of a tracked series.
///
/// The mere presence of the section enables subtitles unless `enabled` is
/// set to false explicitly.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubtitleConfig {
    #[serde(default, deserialize_with = "flexible_opt_bool")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default, deserialize_with = "flexible_opt_bool")]
    pub autogenerated: Option<bool>,
}

/// A compiled regex substitution rule.
///
/// Only the first match is replaced. The replacement uses `${1}` style group
/// references; `\1` style references are translated when loading.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawTitleRewrite")]
pub struct TitleRewrite {
    pattern: Regex,
    replacement: String,
}

impl TitleRewrite {
    /// Compiles a rewrite rule.
    ///
    /// # Arguments
    ///
    /// * `pattern` - Regular expression to search for
    /// * `replacement` - Replacement text, `\1` and `${1}` group references allowed
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: translate_replacement(replacement),
        })
    }

    /// Applies the rule to a title, replacing the first match.
    pub fn apply<'a>(&self, title: &'a str) -> Cow<'a, str> {
        self.pattern.replace(title, self.replacement.as_str())
    }
}

impl PartialEq for TitleRewrite {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.as_str() == other.pattern.as_str() && self.replacement == other.replacement
    }
}

#[derive(Deserialize)]
struct RawTitleRewrite {
    #[serde(rename = "match")]
    pattern: String,
    #[serde(default)]
    replace: String,
}

impl TryFrom<RawTitleRewrite> for TitleRewrite {
    type Error = String;

    fn try_from(raw: RawTitleRewrite) -> Result<Self, Self::Error> {
        TitleRewrite::new(&raw.pattern, &raw.replace)
            .map_err(|e| format!("invalid regex '{}': {}", raw.pattern, e))
    }
}

/// Signed duration added to an episode's air date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawAirDateOffset")]
pub struct AirDateOffset(TimeDelta);

impl AirDateOffset {
    pub fn new(delta: TimeDelta) -> Self {
        Self(delta)
    }

    pub fn delta(&self) -> TimeDelta {
        self.0
    }

    /// Shifts a date by the offset, saturating at the representable range.
    pub fn apply(&self, date: DateTime<Utc>) -> DateTime<Utc> {
        date.checked_add_signed(self.0).unwrap_or(if self.0 < TimeDelta::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
    }
}

#[derive(Deserialize)]
struct RawAirDateOffset {
    #[serde(default)]
    weeks: i64,
    #[serde(default)]
    days: i64,
    #[serde(default)]
    hours: i64,
    #[serde(default)]
    minutes: i64,
}

impl TryFrom<RawAirDateOffset> for AirDateOffset {
    type Error = String;

    fn try_from(raw: RawAirDateOffset) -> Result<Self, Self::Error> {
        [
            TimeDelta::try_weeks(raw.weeks),
            TimeDelta::try_days(raw.days),
            TimeDelta::try_hours(raw.hours),
            TimeDelta::try_minutes(raw.minutes),
        ]
        .into_iter()
        .try_fold(TimeDelta::zero(), |total, part| total.checked_add(&part?))
        .map(AirDateOffset)
        .ok_or_else(|| "offset is out of range".to_string())
    }
}

#[derive(Deserialize)]
struct RawConfig {
    sonarrytdl: RawGeneralSection,
    sonarr: RawSonarrSection,
    ytdl: RawYtdlSection,
    series: Vec<TrackedSeriesConfig>,
}

#[derive(Deserialize)]
struct RawGeneralSection {
    #[serde(default = "default_scan_interval")]
    scan_interval: u64,
    #[serde(default, deserialize_with = "flexible_bool")]
    debug: bool,
}

#[derive(Deserialize)]
struct RawSonarrSection {
    host: String,
    port: u16,
    apikey: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    ssl: bool,
    #[serde(default)]
    basedir: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Deserialize)]
struct RawYtdlSection {
    default_format: String,
    #[serde(default = "default_library_root")]
    library_root: String,
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_MINUTES
}

fn default_library_root() -> String {
    DEFAULT_LIBRARY_ROOT.to_string()
}

impl AppConfig {
    /// Returns the default configuration file location.
    ///
    /// - Linux: ~/.config/sonarr-ytdl/config.yml
    /// - macOS: ~/Library/Application Support/sonarr-ytdl/config.yml
    /// - Windows: %APPDATA%\sonarr-ytdl\config\config.yml
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let proj_dirs = directories::ProjectDirs::from("", "", "sonarr-ytdl")
            .ok_or(ConfigError::ConfigDirectoryNotFound)?;
        Ok(proj_dirs.config_dir().join("config.yml"))
    }

    /// Reads and validates the configuration file at `path`.
    ///
    /// Cookie file names are resolved relative to the directory containing
    /// the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parses and validates configuration content that was read from `path`.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if raw.sonarrytdl.scan_interval == 0 {
            return Err(invalid("sonarrytdl.scan_interval", "must be at least 1 minute"));
        }
        if raw.sonarrytdl.scan_interval > MAX_SCAN_INTERVAL_MINUTES {
            return Err(invalid(
                "sonarrytdl.scan_interval",
                &format!("must be at most {} minutes", MAX_SCAN_INTERVAL_MINUTES),
            ));
        }
        require_non_empty("sonarr.host", &raw.sonarr.host)?;
        require_non_empty("sonarr.apikey", &raw.sonarr.apikey)?;
        require_non_empty("ytdl.default_format", &raw.ytdl.default_format)?;
        validate_series(&raw.series)?;

        let cookie_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            scan_interval_minutes: raw.sonarrytdl.scan_interval,
            debug: raw.sonarrytdl.debug,
            sonarr: SonarrConnection {
                host: raw.sonarr.host,
                port: raw.sonarr.port,
                ssl: raw.sonarr.ssl,
                api_key: raw.sonarr.apikey,
                version: raw
                    .sonarr
                    .version
                    .as_deref()
                    .map(ApiVersion::from_selector)
                    .unwrap_or_default(),
                base_dir: raw.sonarr.basedir,
            },
            download: DownloadSettings {
                default_format: raw.ytdl.default_format,
                library_root: raw.ytdl.library_root,
                cookie_dir,
            },
            series: raw.series,
        })
    }

    /// Returns the scan interval as a duration.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes.saturating_mul(60))
    }
}

/// Rejects empty titles and URLs and titles tracked twice.
fn validate_series(series: &[TrackedSeriesConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for (index, entry) in series.iter().enumerate() {
        require_non_empty(&format!("series[{}].title", index), &entry.title)?;
        require_non_empty(&format!("series[{}].url", index), &entry.url)?;

        if !seen.insert(entry.title.as_str()) {
            return Err(ConfigError::DuplicateSeries(entry.title.clone()));
        }
    }

    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Translates `\1` and `\g<1>` group references to the `${1}` syntax and
/// escapes literal dollar signs.
fn translate_replacement(replacement: &str) -> String {
    let mut result = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' if chars.peek() == Some(&'{') => {
                // Already in the target syntax, copy the reference verbatim
                result.push('$');
            }
            '$' => result.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        group.push(d);
                        chars.next();
                    }
                    result.push_str(&format!("${{{}}}", group));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let name: String = chars.by_ref().take_while(|&c| c != '>').collect();
                        result.push_str(&format!("${{{}}}", name));
                    } else {
                        result.push_str("\\g");
                    }
                }
                Some('\\') => {
                    chars.next();
                    result.push('\\');
                }
                _ => result.push('\\'),
            },
            c => result.push(c),
        }
    }

    result
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Text(String),
}

/// Accepts YAML booleans as well as the strings "true"/"false" in any case.
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(value) => Ok(value),
        BoolOrString::Text(text) => match text.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            other => Err(de::Error::custom(format!(
                "expected a boolean, found '{}'",
                other
            ))),
        },
    }
}

fn flexible_opt_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    flexible_bool(deserializer).map(Some)
}

/// Treats a present but empty section (`subtitles:`) as an all-default one.
fn present_section<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
sonarrytdl:
    scan_interval: 5
    debug: "True"
sonarr:
    host: 192.168.1.123
    port: 8989
    apikey: "12341234"
    ssl: "true"
    basedir: sonarr
    version: v4
ytdl:
    default_format: bestvideo[width<=1920]+bestaudio/best[width<=1920]
series:
  - title: Smarter Every Day
    url: https://www.youtube.com/channel/UC6107grRI4m0o2-emgoDnAA
    cookies_file: youtube_cookies.txt
    format: bestvideo+bestaudio
    subtitles:
      languages: ['en', 'de']
      autogenerated: true
    regex:
      sonarr:
        match: '.-.#[0-9]*$'
        replace: ''
  - title: The Slow Mo Guys
    url: https://www.youtube.com/channel/UCUK0HBIBWgM2c4vsPhkYY4w
    offset:
      days: 2
      hours: -3
    playlistreverse: "False"
    subtitles:
"#;

    fn parse(content: &str) -> Result<AppConfig, ConfigError> {
        AppConfig::parse(content, Path::new("/config/config.yml"))
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(FULL_CONFIG).unwrap();

        assert_eq!(config.scan_interval_minutes, 5);
        assert_eq!(config.scan_interval(), Duration::from_secs(300));
        assert!(config.debug);
        assert!(config.sonarr.ssl);
        assert_eq!(config.sonarr.api_key, "12341234");
        assert_eq!(config.sonarr.version, ApiVersion::V3);
        assert_eq!(config.sonarr.base_url(), "https://192.168.1.123:8989/sonarr");
        assert_eq!(config.download.library_root, DEFAULT_LIBRARY_ROOT);
        assert_eq!(config.download.cookie_dir, PathBuf::from("/config"));

        let first = &config.series[0];
        assert_eq!(first.cookies_file.as_deref(), Some("youtube_cookies.txt"));
        assert_eq!(first.format.as_deref(), Some("bestvideo+bestaudio"));
        assert_eq!(first.playlist_reverse, None);
        let subtitles = first.subtitles.as_ref().unwrap();
        assert_eq!(subtitles.languages, Some(vec!["en".to_string(), "de".to_string()]));
        assert_eq!(subtitles.autogenerated, Some(true));
        assert!(first.regex.sonarr.is_some());
        assert!(first.regex.site.is_none());

        let second = &config.series[1];
        assert_eq!(second.playlist_reverse, Some(false));
        assert_eq!(
            second.offset.map(|o| o.delta()),
            Some(TimeDelta::hours(45))
        );
        // Empty section still enables subtitles with defaults
        assert_eq!(second.subtitles, Some(SubtitleConfig::default()));
    }

    #[test]
    fn test_missing_section_is_fatal() {
        let result = parse(
            r#"
sonarrytdl:
    scan_interval: 1
sonarr:
    host: localhost
    port: 8989
    apikey: abc
series: []
"#,
        );
        assert!(matches!(result, Err(ConfigError::ParseFailed { .. })));
    }

    #[test]
    fn test_defaults() {
        let config = parse(
            r#"
sonarrytdl: {}
sonarr:
    host: localhost
    port: 8989
    apikey: abc
ytdl:
    default_format: best
    library_root: /media
series: []
"#,
        )
        .unwrap();
        assert_eq!(config.scan_interval_minutes, DEFAULT_SCAN_INTERVAL_MINUTES);
        assert!(!config.debug);
        assert!(!config.sonarr.ssl);
        assert_eq!(config.sonarr.version, ApiVersion::Legacy);
        assert_eq!(config.download.library_root, "/media");
    }

    #[test]
    fn test_duplicate_titles_rejected() {
        let result = parse(
            r#"
sonarrytdl: {scan_interval: 1}
sonarr: {host: localhost, port: 8989, apikey: abc}
ytdl: {default_format: best}
series:
  - {title: Example Show, url: "https://example.com/a"}
  - {title: Example Show, url: "https://example.com/b"}
"#,
        );
        assert!(matches!(result, Err(ConfigError::DuplicateSeries(t)) if t == "Example Show"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_interval = parse(
            r#"
sonarrytdl: {scan_interval: 0}
sonarr: {host: localhost, port: 8989, apikey: abc}
ytdl: {default_format: best}
series: []
"#,
        );
        assert!(matches!(zero_interval, Err(ConfigError::InvalidValue { .. })));

        let huge_interval = parse(
            r#"
sonarrytdl: {scan_interval: 18446744073709551615}
sonarr: {host: localhost, port: 8989, apikey: abc}
ytdl: {default_format: best}
series: []
"#,
        );
        assert!(matches!(
            huge_interval,
            Err(ConfigError::InvalidValue { field, .. }) if field == "sonarrytdl.scan_interval"
        ));

        let bad_regex = parse(
            r#"
sonarrytdl: {scan_interval: 1}
sonarr: {host: localhost, port: 8989, apikey: abc}
ytdl: {default_format: best}
series:
  - title: Example Show
    url: https://example.com/a
    regex: {sonarr: {match: "(unclosed", replace: ""}}
"#,
        );
        assert!(matches!(bad_regex, Err(ConfigError::ParseFailed { .. })));

        let bad_bool = parse(
            r#"
sonarrytdl: {scan_interval: 1, debug: maybe}
sonarr: {host: localhost, port: 8989, apikey: abc}
ytdl: {default_format: best}
series: []
"#,
        );
        assert!(matches!(bad_bool, Err(ConfigError::ParseFailed { .. })));
    }

    #[test]
    fn test_longest_interval_accepted() {
        let config = parse(
            r#"
sonarrytdl: {scan_interval: 525600}
sonarr: {host: localhost, port: 8989, apikey: abc}
ytdl: {default_format: best}
series: []
"#,
        )
        .unwrap();
        assert_eq!(config.scan_interval(), Duration::from_secs(525_600 * 60));
    }

    #[test]
    fn test_title_rewrite_replaces_first_match() {
        let rule = TitleRewrite::new(r"\s*#\d+", "").unwrap();
        assert_eq!(rule.apply("Episode #12 and #13"), "Episode and #13");

        let groups = TitleRewrite::new(r"^(\w+) - (\w+)$", r"\2 - \1").unwrap();
        assert_eq!(groups.apply("Alpha - Beta"), "Beta - Alpha");

        let untouched = TitleRewrite::new("zzz", "y").unwrap();
        assert_eq!(untouched.apply("Pilot"), "Pilot");
    }

    #[test]
    fn test_translate_replacement() {
        assert_eq!(translate_replacement(r"\1-\2"), "${1}-${2}");
        assert_eq!(translate_replacement(r"\g<name>"), "${name}");
        assert_eq!(translate_replacement("${1}"), "${1}");
        assert_eq!(translate_replacement("US$ 5"), "US$$ 5");
        assert_eq!(translate_replacement(r"a\\b"), r"a\b");
    }

    #[test]
    fn test_offset_apply() {
        let offset: AirDateOffset = serde_yaml::from_str("{weeks: 1, minutes: -30}").unwrap();
        assert_eq!(offset.delta(), TimeDelta::weeks(1) - TimeDelta::minutes(30));

        let date = DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            offset.apply(date).to_rfc3339(),
            "2024-01-08T11:30:00+00:00"
        );

        let overflow: Result<AirDateOffset, _> = serde_yaml::from_str("{weeks: 9223372036854775807}");
        assert!(overflow.is_err());
    }
}
