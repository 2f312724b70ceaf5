//! Video platform access
//!
//! The video platform is the opaque search-and-fetch engine: it lists the
//! videos of a source URL (single video, playlist or channel) under a title
//! constraint, and downloads a video according to a [`DownloadJobSpec`].

mod ytdlp;

pub use ytdlp::YtDlp;

use crate::job_builder::DownloadJobSpec;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while searching or fetching
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The downloader executable is not available
    #[error("{0} not found. Please install it first.")]
    NotInstalled(String),

    /// The downloader process could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },

    /// The downloader exited unsuccessfully
    #[error("Downloader failed with exit code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// The downloader output could not be understood
    #[error("Failed to parse downloader output: {0}")]
    Parse(String),
}

/// A title-constrained listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Video, playlist or channel URL
    pub source_url: String,
    /// Case-insensitive regex the platform applies to titles itself.
    /// `None` asks for an unfiltered listing.
    pub title_filter: Option<String>,
    /// List the source oldest-first
    pub reverse: bool,
    pub cookie_file: Option<PathBuf>,
}

/// A video listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub title: String,
    /// Canonical page URL of the video, if the platform reported one
    pub url: Option<String>,
}

/// Result of a listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The source resolved to one video
    Single(RemoteEntry),
    /// The source is a collection; entries are in listing order
    Collection(Vec<RemoteEntry>),
}

/// Trait for video platforms that can search and download episodes.
pub trait VideoPlatform {
    /// Lists the videos of a source that satisfy the title filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be extracted.
    fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, PlatformError>;

    /// Downloads and postprocesses a video as described by the job.
    fn fetch(&self, job: &DownloadJobSpec) -> Result<(), PlatformError>;
}
