//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use pomwatch_catalog::CatalogClient;
use pomwatch_core::pipeline::{EntryOutcome, Pipeline, ProgressReporter, RunSummary};
use pomwatch_expander::Expander;
use pomwatch_github::GithubClient;
use pomwatch_shared::{
    AppConfig, CatalogConfig, PipelineConfig, init_config, load_config, load_config_from,
};
use pomwatch_store::S3Store;

/// Env var naming the catalog URL. Flags override it; config files lose to it.
const CATALOG_ENV: &str = "BOOSTER_CATALOG";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pomwatch: booster catalog watcher and effective-POM publisher.
#[derive(Parser)]
#[command(
    name = "pomwatch",
    version,
    about = "Watch a booster catalog and publish expanded effective POMs to a descriptor store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Walk the booster catalog and publish expanded descriptors.
    Run {
        /// Catalog base URL (overrides BOOSTER_CATALOG and the config file).
        #[arg(long)]
        catalog: Option<String>,

        /// Recency window in days; repositories idle for longer are skipped.
        #[arg(long)]
        days: Option<i64>,

        /// Path to an alternate config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Inspect and maintain the descriptor store.
    Store {
        /// Store subcommand.
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Descriptor store subcommands.
#[derive(Subcommand)]
pub(crate) enum StoreAction {
    /// List every stored descriptor key.
    List,

    /// Fetch one stored descriptor.
    Get {
        /// Storage key (SHA-1 of the source descriptor).
        key: String,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete stored descriptors by key.
    Delete {
        /// Keys to delete.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Remove every object from the store bucket.
    Clean,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            catalog,
            days,
            config,
        } => cmd_run(catalog.as_deref(), days, config.as_deref()).await,
        Command::Store { action } => match action {
            StoreAction::List => cmd_store_list().await,
            StoreAction::Get { key, out } => cmd_store_get(&key, out.as_deref()).await,
            StoreAction::Delete { keys } => cmd_store_delete(&keys).await,
            StoreAction::Clean => cmd_store_clean().await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(force).await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Run command
// ---------------------------------------------------------------------------

async fn cmd_run(
    catalog: Option<&str>,
    days: Option<i64>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    // Flag > environment > config file.
    let catalog_url = catalog
        .map(str::to_string)
        .or_else(|| std::env::var(CATALOG_ENV).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| config.catalog.url.clone());
    let catalog_client = CatalogClient::new(&CatalogConfig { url: catalog_url })?;

    let github = GithubClient::new(&config.github)?;
    let expander = Expander::new(&config.expander);
    let store = S3Store::connect(&config.store)?;

    let mut pipeline_config = PipelineConfig::from(&config);
    if let Some(days) = days {
        pipeline_config.days = days;
    }

    info!(
        days = pipeline_config.days,
        delay_ms = pipeline_config.delay_ms,
        "starting catalog run"
    );

    let reporter = CliProgress::new();
    let pipeline = Pipeline::new(github, expander, pipeline_config);
    let summary = match catalog_client.fetch_archive().await {
        Ok(mut archive) => {
            info!(members = archive.member_count(), "scanning catalog archive");
            pipeline.run(archive.entries(), &store, &reporter).await
        }
        Err(e) => {
            // An unreachable catalog is an empty run, not an aborted one.
            error!(error = %e, "catalog archive unavailable");
            let summary = RunSummary::default();
            reporter.done(&summary);
            summary
        }
    };

    // Print summary
    println!();
    println!("  Catalog run finished");
    println!("  Entries:   {}", summary.entries);
    println!("  Published: {}", summary.published);
    println!("  Skipped:   {}", summary.skipped);
    println!("  Failed:    {}", summary.failed);
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    if !summary.errors.is_empty() {
        println!();
        println!("  Failures:");
        for (url, reason) in &summary.errors {
            println!("    {url}: {reason}");
        }
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn entry_started(&self, url: &str, index: usize) {
        self.spinner.set_message(format!("[{index}] {url}"));
    }

    fn entry_finished(&self, url: &str, outcome: &EntryOutcome) {
        if let EntryOutcome::Failed(reason) = outcome {
            self.spinner.println(format!("  failed {url}: {reason}"));
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Store commands
// ---------------------------------------------------------------------------

async fn cmd_store_list() -> Result<()> {
    let store = connect_store()?;
    let keys = store.list_keys().await?;
    if keys.is_empty() {
        println!("No stored descriptors.");
        return Ok(());
    }
    for key in &keys {
        println!("{key}");
    }
    info!(count = keys.len(), "listed stored descriptors");
    Ok(())
}

async fn cmd_store_get(key: &str, out: Option<&Path>) -> Result<()> {
    let store = connect_store()?;
    match out {
        Some(path) => {
            store.retrieve_file(key, path).await?;
            println!("Saved {key} to {}", path.display());
        }
        None => {
            use std::io::Write as _;
            let bytes = store.retrieve_blob(key).await?;
            std::io::stdout().write_all(&bytes)?;
        }
    }
    Ok(())
}

async fn cmd_store_delete(keys: &[String]) -> Result<()> {
    let store = connect_store()?;
    for key in keys {
        match store.delete_object(key).await? {
            Some(version) => println!("Deleted {key} (version {version})"),
            None => println!("Deleted {key}"),
        }
    }
    Ok(())
}

async fn cmd_store_clean() -> Result<()> {
    let store = connect_store()?;
    let removed = store.clean_bucket().await?;
    println!("Removed {removed} stored objects.");
    Ok(())
}

fn connect_store() -> Result<S3Store> {
    let config = load_config()?;
    Ok(S3Store::connect(&config.store)?)
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init(force: bool) -> Result<()> {
    let path = init_config(force)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
