use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, config, daemon, stats, status, sync, verify};

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "rewind")]
#[command(about = "Rewind - keep a local, date-partitioned copy of your Bilibili watch history")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle
    #[command(long_about = "Fetch new watch history pages and merge them into the local store. Without a checkpoint the first run walks the whole remote history; afterwards runs stop at the first page that is already stored.")]
    Sync {
        /// Walk the whole remote history instead of stopping at known pages
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },
    /// Run as daemon with internal scheduler
    #[command(long_about = "Run Rewind in the foreground and trigger a sync cycle on the configured cron schedule. An initial sync runs on startup unless --no-startup-sync is given. Ctrl+C stops the active cycle between pages.")]
    Daemon {
        /// Cron schedule with seconds (e.g., '0 0 */6 * * *' for every 6 hours)
        #[arg(long, value_name = "SCHEDULE")]
        schedule: Option<String>,

        /// Skip initial sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,
    },
    /// Show the last sync report and checkpoint state
    Status,
    /// Show viewing statistics from the local store
    #[command(long_about = "Summarise the local store: entries per month and per category, or a calendar heatmap of daily counts for one year.")]
    Stats {
        /// Restrict to one calendar year (defaults to the year of the latest bucket)
        #[arg(long)]
        year: Option<i32>,

        /// Show a per-day heatmap summary for the year
        #[arg(long, action = ArgAction::SetTrue)]
        heatmap: bool,
    },
    /// Check every stored bucket for corruption, misplaced entries and duplicates
    Verify,
    /// Configure credentials and settings
    #[command(long_about = "Manage configuration and the SESSDATA cookie used to read watch history. Running without a subcommand shows the current configuration.")]
    Config {
        #[command(subcommand)]
        cmd: Option<ConfigCommands>,
    },
    /// Clear local state
    #[command(long_about = "Remove the sync checkpoint (the next run becomes a full backfill) or stored credentials. Stored history buckets are never removed.")]
    Clear {
        /// Clear checkpoint and credentials
        #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["checkpoint", "credentials"])]
        all: bool,

        /// Clear the sync checkpoint and pending walks
        #[arg(long, action = ArgAction::SetTrue)]
        checkpoint: bool,

        /// Clear stored credentials
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration (masks the cookie)
    Show {
        /// Show the cookie unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },

    /// Store the SESSDATA cookie
    #[command(long_about = "Store the SESSDATA cookie from a logged-in bilibili.com browser session. The REWIND_SESSDATA environment variable takes precedence over the stored value.")]
    Cookie {
        /// SESSDATA value (if not provided, will prompt)
        #[arg(long)]
        sessdata: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // The daemon sets up its own logging so it can write to the log file
    if !matches!(cli.command, Commands::Daemon { .. }) {
        logging::init_logging(cli.verbose, cli.quiet).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
    }

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync { full } => sync::run_sync(full, &output).await,
        Commands::Daemon {
            schedule,
            no_startup_sync,
        } => daemon::run_daemon(schedule, no_startup_sync, cli.verbose, cli.quiet, &output).await,
        Commands::Status => status::run_status(&output),
        Commands::Stats { year, heatmap } => stats::run_stats(year, heatmap, &output),
        Commands::Verify => verify::run_verify(&output),
        Commands::Config { cmd } => {
            let cmd = cmd.unwrap_or(ConfigCommands::Show { full: false });
            config::run_config(cmd, &output).await
        }
        Commands::Clear { all, checkpoint, credentials } => clear::run_clear(all, checkpoint, credentials, &output),
    }
}
