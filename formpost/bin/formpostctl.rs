//! Command-line utility for the formpost mail queue
//!
//! - `flush`: deliver everything pending, exiting non-zero if any message
//!   failed
//! - `list`: show pending messages
//! - `submit`: process a submission read from a JSON file

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand, ValueEnum};
use formpost::{Plugin, delivery::FlushTrigger, forms::Submission};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Command-line utility for the formpost mail queue
#[derive(Parser, Debug)]
#[command(name = "formpostctl")]
#[command(about = "Manage the formpost mail queue", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to `FORMPOST_CONFIG`, then the standard
    /// locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Attempt delivery of every pending message
    Flush {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// List pending messages
    List {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Process a submission (JSON) as if a form had just been submitted
    Submit {
        /// Path to the submission
        file: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
struct PendingEntry {
    id: String,
    form: String,
    to: Vec<String>,
    subject: String,
    queued_at: String,
    attempts: u32,
    last_error: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Installed before the plugin's own subscriber, which then stays out of
    // the way. Logs go to stderr so `--format json` output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => formpost::config::find_config_file()?,
    };
    let plugin = formpost::config::load(&config_path)?.init()?;

    match cli.command {
        Commands::Flush { format } => cmd_flush(&plugin, format).await,
        Commands::List { format } => cmd_list(&plugin, format).await,
        Commands::Submit { file } => cmd_submit(&plugin, &file).await,
    }
}

async fn cmd_flush(plugin: &Plugin, format: Format) -> anyhow::Result<ExitCode> {
    let report = plugin.flush(FlushTrigger::Command).await?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => {
            println!("{report}");
            for (id, error) in &report.errors {
                let kind = if error.is_transient() { "will retry" } else { "permanent" };
                println!("  {id}: {error} ({kind})");
            }
        }
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_list(plugin: &Plugin, format: Format) -> anyhow::Result<ExitCode> {
    let pending: Vec<_> = plugin
        .pending()
        .await?
        .into_iter()
        .map(|spooled| PendingEntry {
            id: spooled.id.to_string(),
            form: spooled.message.form.clone(),
            to: spooled.message.to.iter().map(ToString::to_string).collect(),
            subject: spooled.message.subject.clone(),
            queued_at: format_timestamp(spooled.queued_at),
            attempts: spooled.attempts,
            last_error: spooled.last_error,
        })
        .collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&pending)?),
        Format::Text => {
            println!(
                "{:<28} {:<12} {:<24} {:<8} {}",
                "MESSAGE ID", "FORM", "QUEUED", "ATTEMPTS", "LAST ERROR"
            );
            println!("{}", "-".repeat(90));

            for entry in &pending {
                println!(
                    "{:<28} {:<12} {:<24} {:<8} {}",
                    entry.id,
                    entry.form,
                    entry.queued_at,
                    entry.attempts,
                    entry.last_error.as_deref().unwrap_or("-")
                );
            }

            println!("\nTotal: {} message(s)", pending.len());
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_submit(plugin: &Plugin, file: &std::path::Path) -> anyhow::Result<ExitCode> {
    let text = tokio::fs::read_to_string(file).await?;
    let submission: Submission = serde_json::from_str(&text)?;

    let ids = plugin.submit(&submission).await?;
    for id in ids {
        println!("Queued {id}");
    }

    Ok(ExitCode::SUCCESS)
}

fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn format_timestamp(timestamp_ms: u64) -> String {
    use chrono::{TimeZone, Utc};

    let datetime = Utc.timestamp_millis_opt(i64::try_from(timestamp_ms).unwrap_or(0));
    if let chrono::offset::LocalResult::Single(dt) = datetime {
        dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    } else {
        "unknown".to_string()
    }
}
