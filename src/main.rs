mod commands;
mod config;
mod render;
mod state;

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use icalarchive_core::{EventQuery, TimeWindow};
use tracing_subscriber::EnvFilter;

use crate::state::DataDir;

#[derive(Parser)]
#[command(name = "icalarchive")]
#[command(about = "Accumulate calendar feeds forever and publish filtered outputs")]
struct Cli {
    /// Config file (defaults to ~/.config/icalarchive/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where store.json and hidden.json live
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read source feeds and merge them into the archive
    Fetch {
        /// Only fetch this source
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Print an output feed
    Compose {
        output: String,

        /// Include events from this date (YYYY-MM-DD, or "start" for all past events)
        #[arg(long)]
        from: Option<String>,

        /// Include events until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Show why each instance is or is not published instead of the feed
        #[arg(long)]
        explain: bool,
    },
    /// List accumulated events
    Events {
        #[arg(short, long)]
        source: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        /// Case-insensitive summary search
        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = icalarchive_core::listing::DEFAULT_PER_PAGE)]
        per_page: usize,
    },
    /// Hide an event (source::uid) from every output
    Hide { identity: String },
    /// Undo a manual hide
    Show { identity: String },
    /// Show per-source event counts
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so composed feeds on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("icalarchive=info,icalarchive_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data = DataDir::new(match cli.data_dir.as_deref() {
        Some(dir) => config::expand_path(dir),
        None => config::default_data_dir()?,
    });

    match cli.command {
        Commands::Fetch { source } => {
            let cfg = config::load_config(cli.config.as_deref())?;
            commands::fetch::run(&cfg, &data, source.as_deref()).await
        }
        Commands::Compose {
            output,
            from,
            to,
            explain,
        } => {
            let cfg = config::load_config(cli.config.as_deref())?;
            let fallback = cfg.window.window_at(Utc::now())?;
            let window = TimeWindow::from_args(from.as_deref(), to.as_deref(), &fallback)?;
            commands::compose::run(&cfg, &data, &output, window, explain)
        }
        Commands::Events {
            source,
            category,
            search,
            page,
            per_page,
        } => commands::events::run(
            &data,
            EventQuery {
                source,
                category,
                search,
                page,
                per_page,
            },
        ),
        Commands::Hide { identity } => commands::hide::run(&data, &identity, true),
        Commands::Show { identity } => commands::hide::run(&data, &identity, false),
        Commands::Sources => {
            let cfg = config::load_config(cli.config.as_deref())?;
            commands::sources::run(&cfg, &data)
        }
    }
}
