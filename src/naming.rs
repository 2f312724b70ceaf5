//! Destination path resolution
//!
//! Translates the catalog's naming templates into a yt-dlp output template.
//! The file extension is left to yt-dlp via the `%(ext)s` field, since the
//! final container is only known after postprocessing.

use crate::catalog::{CatalogEpisode, CatalogSeries, NamingConfig};

/// yt-dlp output template field for the final file extension
pub const EXTENSION_PLACEHOLDER: &str = "%(ext)s";

/// Quality and source tag embedded in the default file name
const DEFAULT_RELEASE_TAG: &str = "WEB-DL-SonarrYTDL";

/// Sanitizes a string for use in filenames by replacing problematic characters
///
/// Replaces characters that are invalid or problematic in filenames across platforms:
/// - Path separators: / \
/// - Reserved characters: : * ? " < > |
/// - Control characters
/// - Trim leading/trailing whitespace and dots
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    // Trim whitespace and dots from start/end
    sanitized.trim_matches(|c: char| c.is_whitespace() || c == '.').to_string()
}

/// Builds the yt-dlp output template for an episode
///
/// With a naming configuration the catalog's season folder and episode
/// format are used. Without one a fixed pattern is used:
/// `<root><series path>/Season N/<Series> - S01E02 - <Episode> - WEB-DL-SonarrYTDL.%(ext)s`
/// with `Specials` as folder for season 0.
///
/// # Arguments
///
/// * `naming` - Catalog naming configuration, if it could be fetched
/// * `library_root` - Prefix prepended to the series path
/// * `series` - The series the episode belongs to
/// * `episode` - The episode to name
///
/// # Examples
///
/// ```ignore
/// let template = episode_output_template(None, "/sonarr_root", &series, &episode);
/// assert_eq!(
///     template,
///     "/sonarr_root/tv/Example Show/Season 1/Example Show - S01E02 - Pilot - WEB-DL-SonarrYTDL.%(ext)s"
/// );
/// ```
pub fn episode_output_template(
    naming: Option<&NamingConfig>,
    library_root: &str,
    series: &CatalogSeries,
    episode: &CatalogEpisode,
) -> String {
    let series_dir = join_path(library_root, &series.path);

    let relative = match naming {
        Some(naming) => {
            let folder_format = match &naming.specials_folder_format {
                Some(specials) if episode.season_number == 0 => specials,
                _ => &naming.season_folder_format,
            };
            format!(
                "{}/{}",
                render_catalog_template(folder_format, series, episode),
                render_catalog_template(&naming.standard_episode_format, series, episode)
            )
        }
        None => {
            let folder = if episode.season_number == 0 {
                "Specials".to_string()
            } else {
                format!("Season {}", episode.season_number)
            };
            format!(
                "{}/{} - S{:02}E{:02} - {} - {}",
                folder,
                sanitize_filename(&series.title),
                episode.season_number,
                episode.episode_number,
                sanitize_filename(&episode.title),
                DEFAULT_RELEASE_TAG
            )
        }
    };

    format!(
        "{}.{}",
        escape_output_template(&join_path(&series_dir, &relative)),
        EXTENSION_PLACEHOLDER
    )
}

/// Renders a catalog naming template
///
/// Supported tokens (case-insensitive, words may be separated by space, dot,
/// dash or underscore, which is then also used between the words of the value):
/// - `{Series Title}`, `{Series CleanTitle}`
/// - `{Series TitleYear}` - Title followed by `(year)` when the catalog knows the year
/// - `{season}` or `{season:00}` - Season number with optional zero-padding
/// - `{episode}` or `{episode:00}` - Episode number with optional zero-padding
/// - `{Episode Title}`, `{Episode CleanTitle}`
/// - `{Air-Date}` - Air date as `YYYY-MM-DD`
/// - `{Quality Full}`, `{Quality Title}` - Always `WEB-DL`
///
/// Unknown tokens render as nothing.
pub fn render_catalog_template(
    template: &str,
    series: &CatalogSeries,
    episode: &CatalogEpisode,
) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('}') {
            Some(end) => {
                result.push_str(&render_token(&after[..end], series, episode));
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated token, keep the remainder as literal text
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);

    result
}

/// Renders a single token body (without braces)
fn render_token(token: &str, series: &CatalogSeries, episode: &CatalogEpisode) -> String {
    let (name, padding) = match token.split_once(':') {
        Some((name, format)) => (name, Some(format)),
        None => (token, None),
    };

    let separator = name
        .trim()
        .chars()
        .find(|c| matches!(c, ' ' | '.' | '-' | '_'))
        .unwrap_or(' ');
    let key: String = name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    let text = |value: &str| with_separator(&sanitize_filename(value), separator);

    match key.as_str() {
        "seriestitle" | "seriescleantitle" => text(&series.title),
        "seriestitleyear" => text(&title_with_year(series)),
        "episodetitle" | "episodecleantitle" => text(&episode.title),
        "season" => format_number(episode.season_number, padding),
        "episode" => format_number(episode.episode_number, padding),
        "airdate" => episode
            .air_date_utc
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        "qualityfull" | "qualitytitle" => "WEB-DL".to_string(),
        _ => String::new(),
    }
}

/// Appends the year unless the title already ends with it
fn title_with_year(series: &CatalogSeries) -> String {
    match series.year {
        Some(year) if !series.title.ends_with(&format!("({})", year)) => {
            format!("{} ({})", series.title, year)
        }
        _ => series.title.clone(),
    }
}

/// Formats a number, zero-padded to the number of characters in `padding`
fn format_number(value: u32, padding: Option<&str>) -> String {
    let width = padding.map(|p| p.trim().len()).unwrap_or(0);
    format!("{:0width$}", value, width = width)
}

fn with_separator(value: &str, separator: char) -> String {
    if separator == ' ' {
        value.to_string()
    } else {
        value.replace(' ', &separator.to_string())
    }
}

/// Joins two path fragments with exactly one slash between them
fn join_path(base: &str, child: &str) -> String {
    let child = child.trim_start_matches('/');
    if base.is_empty() {
        return format!("/{}", child);
    }
    format!("{}/{}", base.trim_end_matches('/'), child)
}

/// Escapes literal percent signs, which yt-dlp treats as template fields
fn escape_output_template(path: &str) -> String {
    path.replace('%', "%%")
}
