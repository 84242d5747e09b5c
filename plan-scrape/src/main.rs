//! plan-scrape - legacy timetable importer
//!
//! One pass per invocation:
//! - `lectures`: reconcile a semester's lectures with the legacy timetable
//! - `courses`: import course names and credit points
//! - `fetch`: retrieve a document through the cached HTTP layer

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand, ValueEnum};
use plan_common::config::{
    resolve_config_path, resolve_database_path, resolve_legacy_url, LoggingConfig, TomlConfig,
};
use plan_common::db::{init_database, Term};
use plan_scrape::config::{RuntimeSettings, WeekLookupPolicy};
use plan_scrape::fetch::{FetchOptions, Fetcher, ScrapeCache};
use plan_scrape::source::LegacySource;
use plan_scrape::Scraper;
use sqlx::SqlitePool;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for plan-scrape
#[derive(Parser, Debug)]
#[command(name = "plan-scrape")]
#[command(about = "Import the legacy timetable into the schedule store")]
#[command(version)]
struct Args {
    /// Bootstrap TOML file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Schedule store (SQLite file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile lectures for a semester
    Lectures(LectureArgs),
    /// Import course metadata for a semester
    Courses(SemesterArgs),
    /// Fetch a URL through the scrape cache
    Fetch(FetchArgs),
}

#[derive(clap::Args, Debug)]
struct SemesterArgs {
    /// Semester year
    #[arg(long, default_value_t = chrono::Local::now().year())]
    year: i32,

    /// Semester term (spring/autumn, or v/h)
    #[arg(long)]
    term: Term,

    /// Legacy table prefix (default: derived from year and term)
    #[arg(long)]
    prefix: Option<String>,

    /// Legacy database URL
    #[arg(long)]
    legacy_url: Option<String>,
}

#[derive(clap::Args, Debug)]
struct LectureArgs {
    #[command(flatten)]
    semester: SemesterArgs,

    /// Only course codes starting with this text
    #[arg(long)]
    limit: Option<String>,

    /// Override the stored week lookup policy (abort, skip-row)
    #[arg(long)]
    week_policy: Option<WeekLookupPolicy>,

    /// Delete lectures the pass reports as stale
    #[arg(long)]
    delete_stale: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Html,
    Xml,
}

#[derive(clap::Args, Debug)]
struct FetchArgs {
    url: String,

    /// Query parameter as key=value (repeatable)
    #[arg(long = "query", value_parser = parse_key_value)]
    query: Vec<(String, String)>,

    /// Form field as key=value (repeatable); sends a POST
    #[arg(long = "form", value_parser = parse_key_value)]
    form: Vec<(String, String)>,

    /// Always go to the network (the cache is still refreshed)
    #[arg(long)]
    no_cache: bool,

    /// Request timeout in seconds (default: stored setting)
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let (toml_config, config_origin) =
        TomlConfig::load_or_default(config_path.as_deref()).context("Failed to load configuration")?;

    init_tracing(&toml_config.logging)?;

    info!("Starting plan-scrape v{}", env!("CARGO_PKG_VERSION"));
    config_origin.log();

    let db_path = resolve_database_path(args.database.as_deref(), &toml_config);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to open schedule store")?;
    let settings = RuntimeSettings::load(&pool).await?;

    match args.command {
        Command::Lectures(cmd) => run_lectures(pool, &toml_config, &settings, cmd).await,
        Command::Courses(cmd) => run_courses(pool, &toml_config, cmd).await,
        Command::Fetch(cmd) => run_fetch(pool, &settings, cmd).await,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

async fn connect_source(toml_config: &TomlConfig, cli_url: Option<&str>) -> Result<LegacySource> {
    let url = resolve_legacy_url(cli_url, toml_config)?;
    LegacySource::connect(&url)
        .await
        .context("Failed to connect to legacy database")
}

async fn run_lectures(
    pool: SqlitePool,
    toml_config: &TomlConfig,
    settings: &RuntimeSettings,
    cmd: LectureArgs,
) -> Result<()> {
    let source = connect_source(toml_config, cmd.semester.legacy_url.as_deref()).await?;
    let week_policy = cmd.week_policy.unwrap_or(settings.week_lookup_policy);
    let scraper = Scraper::new(pool, source).with_week_policy(week_policy);

    let report = scraper
        .reconcile_lectures(
            cmd.semester.year,
            cmd.semester.term,
            cmd.semester.prefix.as_deref(),
            cmd.limit.as_deref(),
        )
        .await?;

    println!(
        "rows: {}  created: {}  updated: {}  skipped: {}  stale: {}",
        report.source_rows,
        report.created,
        report.updated,
        report.skipped,
        report.stale.len()
    );

    if report.stale.is_empty() {
        return Ok(());
    }

    if cmd.delete_stale {
        scraper.delete_stale(&report).await?;
    } else {
        warn!(
            "{} stale lectures left in place (pass --delete-stale to remove them)",
            report.stale.len()
        );
    }

    Ok(())
}

async fn run_courses(pool: SqlitePool, toml_config: &TomlConfig, cmd: SemesterArgs) -> Result<()> {
    let source = connect_source(toml_config, cmd.legacy_url.as_deref()).await?;
    let scraper = Scraper::new(pool, source);

    let report = scraper
        .update_courses(cmd.year, cmd.term, cmd.prefix.as_deref())
        .await?;

    println!("added: {}  updated: {}", report.added, report.updated);
    Ok(())
}

async fn run_fetch(pool: SqlitePool, settings: &RuntimeSettings, cmd: FetchArgs) -> Result<()> {
    let timeout = cmd
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(settings.http_timeout);
    let fetcher = Fetcher::new(ScrapeCache::new(pool), timeout)?;

    let mut options = FetchOptions::new().bypass_cache(cmd.no_cache).verbose(true);
    options.query = cmd.query;
    if !cmd.form.is_empty() {
        options.form = Some(cmd.form);
    }

    let no_data = || anyhow!("No data from {}", cmd.url);

    match cmd.format {
        OutputFormat::Text => {
            let text = fetcher.plain(&cmd.url, &options).await.ok_or_else(no_data)?;
            println!("{}", text);
        }
        OutputFormat::Json => {
            let value = fetcher.json(&cmd.url, &options).await;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Html => {
            let document = fetcher.html(&cmd.url, &options).await.ok_or_else(no_data)?;
            println!("{}", document.root_element().html());
        }
        OutputFormat::Xml => {
            let root = fetcher.xml(&cmd.url, &options).await.ok_or_else(no_data)?;
            root.write(std::io::stdout().lock())
                .map_err(|e| anyhow!("Failed to write XML: {}", e))?;
            println!();
        }
    }

    Ok(())
}
