//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use quillbook_convert::{CommandContainerConverter, CommandDeviceConverter};
use quillbook_core::{
    BuildConfig, BuildResult, ProgressReporter, SilentProgress, build_book, concatenate,
    fetch_assets, prepare_book,
};
use quillbook_shared::{AppConfig, CONFIG_FILE_NAME, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// quillbook: turn a set of Markdown articles into an ebook.
#[derive(Parser)]
#[command(
    name = "quillbook",
    version,
    about = "Assemble Markdown articles into EPUB and MOBI ebooks.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./quillbook.toml when present).
    #[arg(short, long, global = true, env = "QUILLBOOK_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Build the EPUB and MOBI.
    Build {
        /// Source documents in book order (defaults to [build] chapters).
        files: Vec<PathBuf>,

        /// EPUB output path.
        #[arg(long)]
        epub: Option<PathBuf>,

        /// MOBI output path.
        #[arg(long)]
        mobi: Option<PathBuf>,

        /// Stop after the EPUB.
        #[arg(long)]
        skip_mobi: bool,

        /// Keep the aggregate Markdown and manifest after conversion.
        #[arg(long)]
        keep_intermediates: bool,
    },

    /// Download the remote images the documents reference.
    Fetch {
        /// Source documents (defaults to [build] chapters).
        files: Vec<PathBuf>,
    },

    /// Write the transformed aggregate Markdown without fetching or converting.
    Render {
        /// Source documents (defaults to [build] chapters).
        files: Vec<PathBuf>,

        /// Output file (stdout when omitted).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a config file with defaults.
    Init {
        /// Destination (defaults to ./quillbook.toml).
        #[arg(long)]
        path: Option<PathBuf>,
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
        0 => "quillbook=info",
        1 => "quillbook=debug",
        _ => "quillbook=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Build {
            files,
            epub,
            mobi,
            skip_mobi,
            keep_intermediates,
        } => {
            let overrides = BuildOverrides {
                files,
                epub,
                mobi,
                skip_mobi,
                keep_intermediates,
            };
            cmd_build(config_path, overrides).await
        }
        Command::Fetch { files } => cmd_fetch(config_path, files).await,
        Command::Render { files, out } => cmd_render(config_path, files, out.as_deref()),
        Command::Config { action } => match action {
            ConfigAction::Init { path } => cmd_config_init(path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Command-line values that win over the config file.
#[derive(Debug, Default)]
struct BuildOverrides {
    files: Vec<PathBuf>,
    epub: Option<PathBuf>,
    mobi: Option<PathBuf>,
    skip_mobi: bool,
    keep_intermediates: bool,
}

fn resolve_build_config(config: &AppConfig, overrides: BuildOverrides) -> BuildConfig {
    let mut build = BuildConfig::from(config);
    if !overrides.files.is_empty() {
        build.inputs = overrides.files;
    }
    if let Some(epub) = overrides.epub {
        build.epub_output = epub;
    }
    if let Some(mobi) = overrides.mobi {
        build.mobi_output = Some(mobi);
    }
    if overrides.skip_mobi {
        build.mobi_output = None;
    }
    build.keep_intermediates |= overrides.keep_intermediates;
    build
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(config_path: Option<&Path>, overrides: BuildOverrides) -> Result<()> {
    let config = load_config(config_path)?;
    let build = resolve_build_config(&config, overrides);

    info!(inputs = build.inputs.len(), epub = %build.epub_output.display(), "building book");

    let container = CommandContainerConverter::new(config.converters.container.clone());
    let device = CommandDeviceConverter::new(config.converters.device.clone());
    let reporter = CliProgress::new();

    let result = build_book(&build, &container, &device, &reporter).await?;

    println!();
    println!("  Book built successfully!");
    println!("  Documents: {}", result.documents);
    println!(
        "  Images:    {} downloaded, {} cached",
        result.fetch.downloaded, result.fetch.skipped
    );
    println!("  EPUB:      {}", result.epub.display());
    if let Some(mobi) = &result.mobi {
        println!("  MOBI:      {}", mobi.display());
    }
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_fetch(config_path: Option<&Path>, files: Vec<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let build = resolve_build_config(
        &config,
        BuildOverrides {
            files,
            ..BuildOverrides::default()
        },
    );

    let reporter = CliProgress::new();
    reporter.phase("Preparing documents");
    let prepared = prepare_book(
        &build.inputs,
        &build.transform,
        build.allow_missing_title,
        &reporter,
    )?;

    reporter.phase("Downloading images");
    let report = fetch_assets(&build.fetch, prepared.fetches).await;
    reporter.finish();
    let report = report?;

    println!(
        "  Images: {} downloaded, {} cached ({:.1}s)",
        report.downloaded,
        report.skipped,
        report.duration.as_secs_f64()
    );

    Ok(())
}

fn cmd_render(config_path: Option<&Path>, files: Vec<PathBuf>, out: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let build = resolve_build_config(
        &config,
        BuildOverrides {
            files,
            ..BuildOverrides::default()
        },
    );

    let prepared = prepare_book(
        &build.inputs,
        &build.transform,
        build.allow_missing_title,
        &SilentProgress,
    )?;
    let texts: Vec<&str> = prepared
        .documents
        .iter()
        .map(|d| d.markdown.as_str())
        .collect();
    let aggregate = concatenate(&texts);

    match out {
        Some(path) => {
            std::fs::write(path, &aggregate)?;
            info!(
                path = %path.display(),
                pending_fetches = prepared.fetches.len(),
                "aggregate written"
            );
        }
        None => print!("{aggregate}"),
    }

    Ok(())
}

fn cmd_config_init(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let path = init_config(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_prepared(&self, path: &Path, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Preparing [{current}/{total}] {}", path.display()));
    }

    fn done(&self, _result: &BuildResult) {
        self.finish();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
