use chrono::Utc;
use clap::Parser;
use sonarr_ytdl::{
    AppConfig, CatalogService, Orchestrator, ProgressEvent, Scheduler, SonarrClient,
    SonarrYtdlError, YtDlp,
};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Fetch missing Sonarr episodes from video sites with yt-dlp
#[derive(Parser, Debug)]
#[command(name = "sonarr-ytdl", version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "CONFIGPATH")]
    config: Option<PathBuf>,

    /// Enable debug logging, regardless of the configuration
    #[arg(short, long)]
    debug: bool,

    /// Run a single scan and exit
    #[arg(long)]
    once: bool,

    /// yt-dlp executable to use
    #[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
    ytdlp: String,
}

/// Handles progress events and renders them as log lines
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::Started { at } => {
            info!("Starting scan at {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        ProgressEvent::SeriesMerged {
            catalog_count,
            active_count,
        } => {
            info!(
                "Tracking {} of {} catalog series",
                active_count, catalog_count
            );
        }
        ProgressEvent::EpisodesFiltered {
            series_title,
            needed_count,
        } => {
            if needed_count > 0 {
                info!("{}: {} episode(s) missing", series_title, needed_count);
            }
        }
        ProgressEvent::SearchingEpisode {
            index,
            total,
            series_title,
            season_number,
            episode_number,
            episode_title,
        } => {
            info!(
                "[{}/{}] Searching {} S{:02}E{:02} - {}",
                index + 1,
                total,
                series_title,
                season_number,
                episode_number,
                episode_title
            );
        }
        ProgressEvent::EpisodeMissing { .. } => {
            info!("  Not available yet");
        }
        ProgressEvent::Downloading {
            url,
            output_template,
        } => {
            info!("  Downloading {} to {}", url, output_template);
        }
        ProgressEvent::Downloaded { .. } => {
            info!("  Download complete");
        }
        ProgressEvent::DownloadFailed { reason, .. } => {
            warn!("  Download failed: {}", reason);
        }
        ProgressEvent::Complete { summary } => {
            info!(
                "Scan complete: {} downloaded, {} missing, {} failed",
                summary.downloaded, summary.missing, summary.failed
            );
        }
    }
}

/// Initializes logging; `RUST_LOG` takes precedence over the debug flag
fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sonarr_ytdl={}", level)));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: Args) -> Result<(), SonarrYtdlError> {
    let config_path = match args.config {
        Some(path) => path,
        None => AppConfig::default_path()?,
    };
    let config = AppConfig::load(&config_path)?;

    init_logging(args.debug || config.debug);
    info!("Configuration loaded from {}", config_path.display());
    info!("Scan interval set to {} minute(s)", config.scan_interval_minutes);

    let interval = config.scan_interval();
    let catalog = SonarrClient::new(&config.sonarr)?;
    let platform = YtDlp::new(args.ytdlp);
    platform.ensure_installed()?;

    // Fetched once; without it the default naming pattern is used
    let naming = match catalog.naming_config() {
        Ok(naming) => Some(naming),
        Err(e) => {
            error!(error = %e, "Failed to fetch naming configuration, using default pattern");
            None
        }
    };

    let orchestrator = Orchestrator::new(
        catalog,
        platform,
        config.series,
        config.download,
        naming,
    );

    if args.once {
        orchestrator.run(Utc::now(), handle_progress_event);
        return Ok(());
    }

    Scheduler::new(interval).run(|| {
        orchestrator.run(Utc::now(), handle_progress_event);
    })
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
