use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod dataset;
mod runner;
mod setup;

use config::Config;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: everything, including stream handling
    Trace,
    /// Verbose: model responses and tool observations
    Debug,
    /// Standard: planning rounds and batch progress
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "qs")]
#[command(author, version, about = "Quick-search: multi-agent web research with an LLM", long_about = None)]
pub struct Cli {
    /// Question to answer (same as `qs ask`)
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Model to use (overrides config; default is the server's first model)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Chat endpoint base URL; repeat for several (overrides config)
    #[arg(long = "api-base", global = true)]
    pub api_base: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a question and print the answer
    Ask {
        question: String,

        /// Print the full run record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Answer a dataset of questions, appending results to a JSONL file
    Batch {
        /// Questions as a .json array or .jsonl file
        #[arg(short, long)]
        input: PathBuf,

        /// Results file; questions already in it are skipped
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show current configuration
    Config,
    /// Write a config template to ~/.config/qs
    Setup,
}

fn init_logging(cli: &Cli) -> Result<()> {
    // --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };
    let filter = EnvFilter::new(log_level.as_filter());

    if let Some(log_path) = &cli.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(model) = &cli.model {
        config.chat.model = Some(model.clone());
    }
    if !cli.api_base.is_empty() {
        config.chat.base_urls = cli.api_base.clone();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    // Handle setup before config is loaded
    if matches!(&cli.command, Some(Commands::Setup)) {
        return setup::run();
    }

    let mut config = Config::load()?;
    apply_overrides(&cli, &mut config);

    match &cli.command {
        Some(Commands::Ask { question, json }) => ask(&config, question, *json).await,
        Some(Commands::Batch { input, output }) => runner::batch(&config, input, output).await,
        Some(Commands::Config) => show_config(&config),
        Some(Commands::Setup) => Ok(()),
        None => match &cli.prompt {
            Some(question) => ask(&config, question, false).await,
            None => {
                anyhow::bail!("Nothing to do. Try `qs ask \"<question>\"` or `qs --help`.")
            }
        },
    }
}

async fn ask(config: &Config, question: &str, json: bool) -> Result<()> {
    let record = runner::ask(config, question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", record.response);
    }

    match record.errmsg {
        Some(errmsg) => anyhow::bail!("Run failed: {errmsg}"),
        None => Ok(()),
    }
}

fn show_config(config: &Config) -> Result<()> {
    let path = Config::config_path()?;
    let status = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("# Config file: {}{}\n", path.display(), status);
    print!("{}", toml::to_string_pretty(&config.masked())?);
    Ok(())
}
