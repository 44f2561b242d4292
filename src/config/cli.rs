use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "fanout-sync")]
#[command(about = "Sync hierarchical API listings into tables with an audited, batched log")]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "sync.toml", global = true)]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Log CPU and memory usage around each domain
    #[arg(long, global = true)]
    pub monitor: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the sync for selected domains (all enabled domains by default)
    Sync {
        #[arg(long = "domain")]
        domains: Vec<String>,
    },
    /// Delete log rows older than the retention window
    Cleanup {
        #[arg(long)]
        retention_days: Option<u32>,
    },
    /// Show the last successful sync time per domain
    LastSync {
        #[arg(long = "domain")]
        domains: Vec<String>,
    },
    /// Load and validate the configuration without syncing
    Validate,
    /// Run the sync periodically until interrupted
    Schedule {
        #[arg(long, default_value = "60")]
        every_minutes: u64,

        /// Run log cleanup after every N sync rounds
        #[arg(long, default_value = "24")]
        cleanup_every_runs: u64,
    },
}
