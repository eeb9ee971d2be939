use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mirror risk-assessment tables into object storage as full JSON snapshots
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concat!(
    "Environment variables:\n",
    "  TIDEMARK_CONFIG         Path to the YAML configuration\n",
    "  TIDEMARK_SOURCE_URL     Overrides source.url\n",
    "  TIDEMARK_SOURCE_TOKEN   Overrides source.auth_token\n",
    "  TIDEMARK_INTERVAL_SECS  Overrides schedule.interval_secs\n",
    "  TIDEMARK_GCS_TOKEN      Overrides sink.access_token for the gcs sink\n",
    "  RUST_LOG                Log filter (default: info)\n\n",
    "Examples:\n",
    "  # Sync on the configured schedule until interrupted\n",
    "  $ tidemark-daemon --config config/tidemark.yaml run\n\n",
    "  # Run one sync now and print the report\n",
    "  $ tidemark-daemon --config config/tidemark.yaml sync\n\n",
    "  # Show watermarks and time until the next scheduled run\n",
    "  $ tidemark-daemon --config config/tidemark.yaml status --json\n",
))]
pub struct RootCommand {
    /// YAML configuration file; built-in defaults are used when omitted
    #[arg(short, long, value_name = "PATH", env = "TIDEMARK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub action: Option<SubCommands>,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    /// Sync immediately, then on every interval until Ctrl-C
    #[command(alias = "daemon")]
    Run,
    /// Run a single sync and exit
    Sync {
        /// Print the run summary as JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Show per-entity watermarks and the time until the next run
    Status {
        #[arg(long)]
        json: bool,
    },
}
