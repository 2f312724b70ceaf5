//! yt-dlp based video platform
//!
//! This module provides an implementation of the VideoPlatform trait that runs
//! the yt-dlp command line program for both listing and downloading.

use super::{PlatformError, RemoteEntry, SearchOutcome, SearchRequest, VideoPlatform};
use crate::job_builder::{DownloadJobSpec, PostProcessor};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info};

/// Number of stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Video platform using the yt-dlp CLI
///
/// Searching uses `--dump-single-json` and parses the printed info dict,
/// fetching streams the progress output into the log.
pub struct YtDlp {
    /// Name or path of the yt-dlp executable
    program: String,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlp {
    /// Creates a new YtDlp platform running the given executable
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Checks if the executable is installed and available
    fn is_installed(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Fails with [`PlatformError::NotInstalled`] if the executable cannot be run.
    pub fn ensure_installed(&self) -> Result<(), PlatformError> {
        if self.is_installed() {
            Ok(())
        } else {
            Err(PlatformError::NotInstalled(self.program.clone()))
        }
    }
}

impl VideoPlatform for YtDlp {
    fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, PlatformError> {
        let args = search_arguments(request);
        debug!(program = %self.program, ?args, "Searching");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PlatformError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        interpret_search_output(
            output.status.success(),
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    fn fetch(&self, job: &DownloadJobSpec) -> Result<(), PlatformError> {
        let args = fetch_arguments(job);
        debug!(program = %self.program, ?args, "Downloading");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PlatformError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        // Drain stderr on its own thread so a chatty child cannot block on a full pipe
        let stderr_reader = child.stderr.take().map(|stderr| thread::spawn(move || tail_lines(stderr)));

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if line.starts_with("[download] Destination:") || line.starts_with("[Merger]") {
                    info!("      {}", line);
                } else {
                    debug!("{}", line);
                }
            }
        }

        let status = child.wait().map_err(|e| PlatformError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(PlatformError::Failed {
                code: status.code(),
                stderr,
            });
        }

        Ok(())
    }
}

/// Reads a stream to its end and keeps the last lines
fn tail_lines<R: Read>(stream: R) -> String {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(stream).lines().map_while(Result::ok) {
        debug!("{}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Turns the result of a listing run into a search outcome
///
/// With `--ignore-errors` yt-dlp may exit non-zero yet still print a result.
/// A successful run printing nothing means every video was filtered out.
fn interpret_search_output(
    success: bool,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<SearchOutcome, PlatformError> {
    if !stdout.trim().is_empty() {
        return parse_search_output(stdout);
    }
    if success {
        return Ok(SearchOutcome::Collection(Vec::new()));
    }
    Err(PlatformError::Failed {
        code,
        stderr: stderr.trim().to_string(),
    })
}

/// Builds a `--match-filters` expression matching titles case-insensitively
///
/// Quotes are escaped for the filter's quoted string, and `&` is escaped so
/// yt-dlp does not split the expression into several filters.
fn title_match_filter(pattern: &str) -> String {
    let quoted = pattern
        .replace(r"\&", "&")
        .replace('&', r"\&")
        .replace('\'', r"\'");
    format!("title~='(?i){}'", quoted)
}

/// Builds the yt-dlp arguments for a listing request
fn search_arguments(request: &SearchRequest) -> Vec<String> {
    let mut args = vec![
        "--dump-single-json".to_string(),
        "--ignore-errors".to_string(),
        "--no-warnings".to_string(),
    ];

    match &request.title_filter {
        Some(filter) => {
            args.push("--match-filters".to_string());
            args.push(title_match_filter(filter));
        }
        None => args.push("--flat-playlist".to_string()),
    }

    if request.reverse {
        args.push("--playlist-reverse".to_string());
    }

    if let Some(cookies) = &request.cookie_file {
        args.push("--cookies".to_string());
        args.push(cookies.display().to_string());
    }

    args.push("--".to_string());
    args.push(request.source_url.clone());
    args
}

/// Builds the yt-dlp arguments for a download job
fn fetch_arguments(job: &DownloadJobSpec) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        job.format.clone(),
        "-o".to_string(),
        job.output_template.clone(),
        "--merge-output-format".to_string(),
        job.merge_output_format.clone(),
        "--retry-sleep".to_string(),
        job.retry.retry_sleep_secs.to_string(),
    ];

    if job.no_playlist {
        args.push("--no-playlist".to_string());
    }
    if job.ignore_errors {
        args.push("--ignore-errors".to_string());
    }
    if job.report_progress {
        args.push("--newline".to_string());
    } else {
        args.push("--no-progress".to_string());
    }
    if let Some(retries) = job.retry.retries {
        args.push("--retries".to_string());
        args.push(retries.to_string());
    }
    if let Some(seconds) = job.retry.sleep_interval_secs {
        args.push("--sleep-interval".to_string());
        args.push(seconds.to_string());
    }
    if let Some(seconds) = job.retry.sleep_requests_secs {
        args.push("--sleep-requests".to_string());
        args.push(seconds.to_string());
    }
    if let Some(cookies) = &job.cookie_file {
        args.push("--cookies".to_string());
        args.push(cookies.display().to_string());
    }
    if let Some(subtitles) = &job.subtitles {
        args.push("--write-subs".to_string());
        if subtitles.auto_generated {
            args.push("--write-auto-subs".to_string());
        }
        args.push("--sub-langs".to_string());
        args.push(subtitles.languages.join(","));
    }

    for step in &job.post_processors {
        match step {
            PostProcessor::RemuxVideo { container } => {
                args.push("--remux-video".to_string());
                args.push(container.clone());
            }
            PostProcessor::ConvertSubtitles { format } => {
                args.push("--convert-subs".to_string());
                args.push(format.clone());
            }
            PostProcessor::EmbedSubtitles => args.push("--embed-subs".to_string()),
        }
    }

    args.push("--".to_string());
    args.push(job.url.clone());
    args
}

/// Parses the info dict printed by `--dump-single-json`
///
/// A dict with an `entries` list is a collection; nested collections (e.g.
/// channel tabs) are flattened in order and `null` entries, which yt-dlp
/// emits for items that failed to extract, are skipped.
fn parse_search_output(output: &str) -> Result<SearchOutcome, PlatformError> {
    let value: Value =
        serde_json::from_str(output.trim()).map_err(|e| PlatformError::Parse(e.to_string()))?;

    match &value {
        Value::Null => Ok(SearchOutcome::Collection(Vec::new())),
        Value::Object(map) if map.contains_key("entries") => {
            let mut entries = Vec::new();
            flatten_entries(&value, &mut entries);
            Ok(SearchOutcome::Collection(entries))
        }
        Value::Object(_) => Ok(SearchOutcome::Single(to_entry(&value))),
        other => Err(PlatformError::Parse(format!(
            "expected a JSON object, found {}",
            other
        ))),
    }
}

fn flatten_entries(value: &Value, entries: &mut Vec<RemoteEntry>) {
    let Some(children) = value.get("entries").and_then(Value::as_array) else {
        return;
    };

    for child in children.iter().filter(|child| child.is_object()) {
        if child.get("entries").is_some() {
            flatten_entries(child, entries);
        } else {
            entries.push(to_entry(child));
        }
    }
}

fn to_entry(value: &Value) -> RemoteEntry {
    let url = ["webpage_url", "url"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    RemoteEntry {
        title: value
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_builder::DownloadJobBuilder;
    use crate::series_rules::SubtitlePolicy;
    use std::path::PathBuf;

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn test_search_arguments_with_filter() {
        let args = search_arguments(&SearchRequest {
            source_url: "https://example.com/playlist".to_string(),
            title_filter: Some("PILOT".to_string()),
            reverse: true,
            cookie_file: Some(PathBuf::from("/config/cookies.txt")),
        });

        let filter = position(&args, "--match-filters").unwrap();
        assert_eq!(args[filter + 1], "title~='(?i)PILOT'");
        assert!(args.contains(&"--playlist-reverse".to_string()));
        assert!(!args.contains(&"--flat-playlist".to_string()));
        let cookies = position(&args, "--cookies").unwrap();
        assert_eq!(args[cookies + 1], "/config/cookies.txt");
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/playlist"));
    }

    #[test]
    fn test_search_arguments_without_filter() {
        let args = search_arguments(&SearchRequest {
            source_url: "https://example.com/channel".to_string(),
            title_filter: None,
            reverse: false,
            cookie_file: None,
        });
        assert!(args.contains(&"--flat-playlist".to_string()));
        assert!(position(&args, "--match-filters").is_none());
        assert!(position(&args, "--playlist-reverse").is_none());
        assert!(position(&args, "--cookies").is_none());
    }

    #[test]
    fn test_fetch_arguments_follow_job() {
        let job = DownloadJobBuilder::new(
            "https://example.com/v/1",
            "/out/Show - S01E01.%(ext)s".to_string(),
            "best",
        )
        .subtitles(&SubtitlePolicy {
            enabled: true,
            languages: vec!["en".to_string(), "de".to_string()],
            auto_generated: false,
        })
        .build();
        let args = fetch_arguments(&job);

        assert_eq!(&args[..4], &["-f", "best", "-o", "/out/Show - S01E01.%(ext)s"]);
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"--write-subs".to_string()));
        assert!(!args.contains(&"--write-auto-subs".to_string()));
        assert_eq!(args[position(&args, "--sub-langs").unwrap() + 1], "en,de");
        assert_eq!(args[position(&args, "--retries").unwrap() + 1], "10");

        // Postprocessing order is preserved
        let remux = position(&args, "--remux-video").unwrap();
        let convert = position(&args, "--convert-subs").unwrap();
        let embed = position(&args, "--embed-subs").unwrap();
        assert!(remux < convert && convert < embed);
        assert_eq!(args[convert + 1], "srt");
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/v/1"));
    }

    #[test]
    fn test_parse_single_video() {
        let outcome = parse_search_output(
            r#"{"id": "abc", "title": "Pilot", "webpage_url": "https://example.com/watch?v=abc"}"#,
        )
        .unwrap();
        assert_eq!(
            outcome,
            SearchOutcome::Single(RemoteEntry {
                title: "Pilot".to_string(),
                url: Some("https://example.com/watch?v=abc".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_nested_collection() {
        let outcome = parse_search_output(
            r#"{
                "_type": "playlist",
                "title": "Channel",
                "entries": [
                    null,
                    {"title": "Videos", "entries": [
                        {"title": "First", "webpage_url": "https://example.com/1"},
                        {"title": "Second", "url": "https://example.com/2"}
                    ]},
                    {"title": "Third"}
                ]
            }"#,
        )
        .unwrap();

        let SearchOutcome::Collection(entries) = outcome else {
            panic!("expected a collection");
        };
        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
        assert_eq!(entries[1].url.as_deref(), Some("https://example.com/2"));
        assert_eq!(entries[2].url, None);
    }

    #[test]
    fn test_title_match_filter_escaping() {
        assert_eq!(title_match_filter("PILOT"), "title~='(?i)PILOT'");
        assert_eq!(title_match_filter("DON'?T"), r"title~='(?i)DON\'?T'");
        assert_eq!(
            title_match_filter("ROCK (AND|&) ROLL"),
            r"title~='(?i)ROCK (AND|\&) ROLL'"
        );
        // A regex-escaped ampersand ends up escaped exactly once
        assert_eq!(title_match_filter(r"TOM \& JERRY"), r"title~='(?i)TOM \& JERRY'");
        assert_eq!(title_match_filter(r"MR\.? BIG"), r"title~='(?i)MR\.? BIG'");
    }

    #[test]
    fn test_empty_output_of_successful_search_is_no_match() {
        assert_eq!(
            interpret_search_output(true, Some(0), "\n", "").unwrap(),
            SearchOutcome::Collection(Vec::new())
        );
    }

    #[test]
    fn test_empty_output_of_failed_search_is_an_error() {
        let result = interpret_search_output(false, Some(1), "", "ERROR: Unsupported URL\n");
        assert!(matches!(
            result,
            Err(PlatformError::Failed { code: Some(1), stderr }) if stderr == "ERROR: Unsupported URL"
        ));
    }

    #[test]
    fn test_printed_result_wins_over_exit_code() {
        let outcome =
            interpret_search_output(false, Some(1), r#"{"entries": [{"title": "Pilot"}]}"#, "")
                .unwrap();
        assert_eq!(
            outcome,
            SearchOutcome::Collection(vec![RemoteEntry {
                title: "Pilot".to_string(),
                url: None,
            }])
        );
    }

    #[test]
    fn test_calls_run_the_program_directly() {
        let platform = YtDlp::new("/nonexistent/yt-dlp");
        let request = SearchRequest {
            source_url: "https://example.com/playlist".to_string(),
            title_filter: None,
            reverse: true,
            cookie_file: None,
        };
        assert!(matches!(platform.search(&request), Err(PlatformError::Spawn { .. })));

        let job = DownloadJobBuilder::new("https://example.com/v/1", "/out.%(ext)s".to_string(), "best")
            .build();
        assert!(matches!(platform.fetch(&job), Err(PlatformError::Spawn { .. })));

        assert!(matches!(
            platform.ensure_installed(),
            Err(PlatformError::NotInstalled(program)) if program == "/nonexistent/yt-dlp"
        ));
    }

    #[test]
    fn test_parse_null_and_garbage() {
        assert_eq!(
            parse_search_output("null\n").unwrap(),
            SearchOutcome::Collection(Vec::new())
        );
        assert!(matches!(parse_search_output("ERROR: boom"), Err(PlatformError::Parse(_))));
        assert!(matches!(parse_search_output("[1, 2]"), Err(PlatformError::Parse(_))));
    }
}
