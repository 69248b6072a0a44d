//! marginalia — self-hosted comment backend for Git-based static sites.
//!
//! A single binary: `serve` runs the HTTP server plus the pipeline
//! worker; the remaining subcommands drive individual pipeline stages
//! and administration out-of-band. All subcommands exit non-zero on
//! failure.
//!
//! ```text
//! marginalia serve --config marginalia.toml
//! marginalia pipeline-run --site-key blog
//! marginalia generate --site-key blog
//! marginalia user add --email admin@example.org --password secret
//! ```

mod commands;

use clap::{Parser, Subcommand};
use marginalia_core::Config;
use marginalia_state::Store;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "marginalia", about = "Self-hosted comment backend for Hugo sites (Git-based workflow)")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short = 'c', global = true, default_value = "marginalia.toml", env = "MARGINALIA_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and the pipeline worker.
    Serve,

    /// Run the full pipeline (checkout → generate → hugo → commit → push).
    PipelineRun {
        #[arg(long, alias = "site-id")]
        site_key: String,
    },

    /// Generate comment markdown files into the working directory.
    Generate {
        #[arg(long, alias = "site-id")]
        site_key: String,
    },

    /// Fresh clone of the site repository (plus themes).
    GitCheckout {
        #[arg(long, alias = "site-id")]
        site_key: String,
    },

    /// Commit working-directory changes, if any.
    GitCommit {
        #[arg(long, alias = "site-id")]
        site_key: String,
        /// Commit message; defaults to "Update generated content".
        #[arg(long)]
        message: Option<String>,
    },

    /// Push the working directory to origin.
    GitPush {
        #[arg(long, alias = "site-id")]
        site_key: String,
    },

    /// Run the site generator in the working directory.
    HugoRun {
        #[arg(long, alias = "site-id")]
        site_key: String,
    },

    /// Show recent pipeline runs.
    Runs {
        #[arg(long)]
        site_key: Option<String>,
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Site administration.
    Site {
        #[command(subcommand)]
        command: commands::site::SiteCommand,
    },

    /// Admin user management.
    User {
        #[command(subcommand)]
        command: commands::user::UserCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,marginalia=debug".into())
    };
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
    }

    let cli = Cli::parse();
    let config = Arc::new(Config::from_file(&cli.config)?);
    let store = Store::open(&config.sqlite.path)?;

    match cli.command {
        Command::Serve => commands::serve::run(config, store).await,
        Command::PipelineRun { site_key } => {
            commands::pipeline::pipeline_run(config, store, &site_key).await
        }
        Command::Generate { site_key } => commands::pipeline::generate(config, store, &site_key),
        Command::GitCheckout { site_key } => {
            commands::pipeline::git_checkout(config, &site_key).await
        }
        Command::GitCommit { site_key, message } => {
            commands::pipeline::git_commit(config, &site_key, message.as_deref()).await
        }
        Command::GitPush { site_key } => commands::pipeline::git_push(config, &site_key).await,
        Command::HugoRun { site_key } => commands::pipeline::hugo_run(config, &site_key).await,
        Command::Runs { site_key, limit } => {
            commands::pipeline::show_runs(store, site_key.as_deref(), limit)
        }
        Command::Site { command } => commands::site::run(command, config, store),
        Command::User { command } => commands::user::run(command, store),
    }
}
