//! Remote match resolution
//!
//! Locates the remote video for an episode by searching the configured
//! source under a title constraint. The resolver never fails: every search
//! problem turns into a "not found" result so the episode is simply retried
//! on the next run.

use crate::config::TitleRewrite;
use crate::platform::{SearchOutcome, SearchRequest, VideoPlatform};
use regex::{Regex, RegexBuilder};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Outcome of a remote search for one episode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    /// URL of the matched video, `None` when nothing was found
    pub url: Option<String>,
}

impl MatchResult {
    pub fn not_found() -> Self {
        Self { url: None }
    }

    pub fn found_at(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
        }
    }

    pub fn found(&self) -> bool {
        self.url.is_some()
    }
}

/// Everything needed to search for one episode.
#[derive(Debug, Clone)]
pub struct MatchQuery<'a> {
    /// Episode title after the catalog title rewrite
    pub title: &'a str,
    /// Video, playlist or channel URL to search
    pub source_url: &'a str,
    /// Search oldest-first
    pub reverse: bool,
    /// Cookie file to send, only passed when it exists
    pub cookie_file: Option<PathBuf>,
    /// Rewrite applied to remote titles before matching
    pub remote_title_rewrite: Option<&'a TitleRewrite>,
}

/// Builds the title constraint used to find an episode
///
/// The title is upper-cased, typographic quotes are normalised and regex
/// metacharacters are escaped. To tolerate small differences between the
/// catalog and the remote title, " AND " also accepts "&", and apostrophes,
/// commas, exclamation marks, periods, question marks, colons and the
/// letter S are optional. The constraint is meant for case-insensitive
/// matching.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(title_constraint("Rock and Roll!"), "ROCK (AND|&) ROLL!?");
/// ```
pub fn title_constraint(title: &str) -> String {
    let normalized = title
        .to_uppercase()
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"");

    regex::escape(&normalized)
        .replace(" AND ", " (AND|&) ")
        .replace(r"\?", r"\??")
        .replace(r"\.", r"\.?")
        .replace('\'', "'?")
        .replace(',', ",?")
        .replace('!', "!?")
        .replace(':', ":?")
        .replace('S', "S?")
}

/// Compiles a title constraint for case-insensitive local matching.
fn compile_constraint(constraint: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(constraint).case_insensitive(true).build()
}

/// Searches the source for the episode and returns the first match
///
/// The platform applies the title constraint itself, unless the series
/// rewrites remote titles; then an unfiltered listing is requested and the
/// rewritten titles are matched locally. A source that resolves to a single
/// video whose URL is the source URL itself is not a match: it means the
/// source is not a collection to search in. Episodes with a blank title
/// are never searched for.
///
/// # Arguments
///
/// * `platform` - The video platform to search
/// * `query` - Episode title, source and search preferences
///
/// # Returns
///
/// The matched video URL, or a not-found result on any failure
pub fn resolve_match<P>(platform: &P, query: &MatchQuery<'_>) -> MatchResult
where
    P: VideoPlatform + ?Sized,
{
    // A blank constraint would match every video of the source
    if query.title.trim().is_empty() {
        info!(source = %query.source_url, "Episode has no title to search for");
        return MatchResult::not_found();
    }

    let constraint = title_constraint(query.title);

    let local_filter = match query.remote_title_rewrite {
        Some(rewrite) => match compile_constraint(&constraint) {
            Ok(pattern) => Some((rewrite, pattern)),
            Err(e) => {
                error!(title = %query.title, error = %e, "Invalid title constraint");
                return MatchResult::not_found();
            }
        },
        None => None,
    };

    let request = SearchRequest {
        source_url: query.source_url.to_string(),
        title_filter: local_filter.is_none().then(|| constraint.clone()),
        reverse: query.reverse,
        cookie_file: query.cookie_file.clone(),
    };
    debug!(?request, "Episode search options");

    let outcome = match platform.search(&request) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(source = %query.source_url, title = %query.title, error = %e, "Search failed");
            return MatchResult::not_found();
        }
    };

    let accepts = |title: &str| match &local_filter {
        Some((rewrite, pattern)) => pattern.is_match(&rewrite.apply(title)),
        None => true,
    };

    let candidate = match outcome {
        SearchOutcome::Single(entry) => Some(entry).filter(|e| accepts(&e.title)),
        SearchOutcome::Collection(entries) => entries.into_iter().find(|e| accepts(&e.title)),
    };

    let Some(entry) = candidate else {
        debug!(source = %query.source_url, title = %query.title, "No matching entry");
        return MatchResult::not_found();
    };

    match entry.url {
        Some(url) if url == query.source_url => {
            debug!(source = %query.source_url, "Source resolved to itself");
            MatchResult::not_found()
        }
        Some(url) => MatchResult::found_at(url),
        None => {
            error!(title = %entry.title, "No video url");
            MatchResult::not_found()
        }
    }
}
