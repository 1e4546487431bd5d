use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use the library instead of redeclaring modules
use m3u_curator::{
    config::Config,
    export::Reconciler,
    ingestor::{ParseOptions, PlaylistSession},
    models::DesiredSet,
    proxy::{PlaylistGenerator, StreamUriBuilder},
    sources::XtreamCatalogClient,
    utils::StandardHttpClient,
};

#[derive(Parser)]
#[command(name = "m3u-curator")]
#[command(version)]
#[command(about = "Curates M3U and Xtream catalogs into playlists and STRM libraries")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_default_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List the groups in a playlist with their entry counts
    Groups {
        /// Playlist file path or http(s) URL
        #[arg(short, long)]
        input: String,
    },
    /// Print the entries of one playlist group as JSON
    Entries {
        /// Playlist file path or http(s) URL
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        group: String,
    },
    /// Fetch the upstream Xtream catalog as JSON
    FetchCatalog {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render a desired set as playlist text
    Generate {
        /// Desired set JSON: { entries, overrides, enrichment }
        #[arg(short, long)]
        desired: PathBuf,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Reconcile the export directory against a desired set
    Export {
        /// Desired set JSON: { entries, overrides, enrichment }
        #[arg(short, long)]
        desired: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", Config::default_toml()?);
        return Ok(());
    }

    // Initialize logging with specified level
    let log_filter = format!("m3u_curator={}", cli.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    let Some(command) = cli.command else {
        bail!("no command given; see --help");
    };

    let config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config.display());

    match command {
        Command::Groups { input } => {
            let mut session = open_session(&config, &input).await?;
            for group in session.scan_groups()? {
                println!("{}\t{}", group.name, group.count);
            }
            if session.skipped_lines() > 0 {
                warn!(
                    "Skipped {} malformed lines in {}",
                    session.skipped_lines(),
                    session.label()
                );
            }
            session.close();
        }
        Command::Entries { input, group } => {
            let mut session = open_session(&config, &input).await?;
            session.scan_groups()?;
            let entries = session.entries_for_group(&group)?;
            session.close();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::FetchCatalog { output } => {
            let upstream = config
                .upstream
                .clone()
                .context("fetch-catalog needs an [upstream] section in the configuration")?;
            let client = XtreamCatalogClient::new(http_client(&config)?, upstream, &config.ingestion);
            client.verify_account().await?;

            let snapshot = client.fetch_catalog().await;
            for failure in &snapshot.failures {
                warn!("Catalog fetch incomplete: {failure}");
            }
            info!(
                "Fetched {} live, {} movies, {} episodes",
                snapshot.live.len(),
                snapshot.movies.len(),
                snapshot.episodes.len()
            );
            emit(&serde_json::to_string_pretty(&snapshot)?, output.as_deref()).await?;
        }
        Command::Generate { desired, output } => {
            let desired = read_desired(&desired).await?;
            let generator = PlaylistGenerator::new(&config.generator, uri_builder(&config));
            let playlist = generator.synthesize_desired(&desired)?;
            emit(&playlist, output.as_deref()).await?;
        }
        Command::Export { desired } => {
            let desired = read_desired(&desired).await?;
            let reconciler = Reconciler::new(&config.export, uri_builder(&config));
            let summary = reconciler.run(&desired).await?;
            for failure in &summary.failures {
                eprintln!("{failure}");
            }
            println!("{}", summary.summary());
        }
    }

    Ok(())
}

fn http_client(config: &Config) -> Result<StandardHttpClient> {
    Ok(StandardHttpClient::new(
        config.ingestion.connect_timeout()?,
        config.ingestion.request_timeout()?,
    )?)
}

fn uri_builder(config: &Config) -> StreamUriBuilder {
    StreamUriBuilder::from_config(&config.generator, config.upstream.as_ref())
}

async fn open_session(config: &Config, input: &str) -> Result<PlaylistSession> {
    let options = ParseOptions::from(&config.ingestion);
    let session = if input.starts_with("http://") || input.starts_with("https://") {
        PlaylistSession::open_url(&http_client(config)?, input, options).await?
    } else {
        PlaylistSession::open_path(input, options)
            .await
            .with_context(|| format!("reading playlist {input}"))?
    };
    Ok(session)
}

async fn read_desired(path: &Path) -> Result<DesiredSet> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading desired set {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing desired set {}", path.display()))
}

async fn emit(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            PlaylistGenerator::write_atomic(path, content).await?;
        }
        None => print!("{content}"),
    }
    Ok(())
}
