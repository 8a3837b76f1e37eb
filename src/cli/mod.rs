pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dreader")]
#[command(about = "Archive chat channel history from the web client", long_about = None)]
pub struct Cli {
    /// SQLite database path (default: platform data dir)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file path (default: ~/.config/dreader/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and apply migrations
    InitDb,
    /// Delete all archived data and recreate the schema
    ResetDb {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Scrape a channel's history (Ctrl-C pauses the job)
    Scrape(ScrapeArgs),
    /// List archived servers
    Servers,
    /// List archived channels
    Channels {
        /// Only channels of this server
        #[arg(long)]
        server: Option<String>,
    },
    /// Show the newest archived messages of a channel
    Messages {
        #[arg(long)]
        channel: String,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// List threads started in a channel
    Threads {
        #[arg(long)]
        channel: String,
    },
    /// List scrape jobs
    Jobs {
        #[arg(long)]
        channel: Option<String>,
    },
    /// Cancel a scrape job, e.g. one left running by a killed process
    CancelJob {
        /// Job id (see `jobs`)
        id: i64,
    },
    /// Remove a channel and all of its messages
    RemoveChannel {
        /// Channel id
        id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    /// Server (guild) id
    #[arg(long)]
    pub server_id: String,

    /// Channel id
    #[arg(long)]
    pub channel_id: String,

    #[arg(long)]
    pub server_name: Option<String>,

    #[arg(long)]
    pub channel_name: Option<String>,

    /// text, announcement, forum, thread or voice
    #[arg(long, default_value = "text")]
    pub kind: String,

    /// Channel page URL, overriding the configured template
    #[arg(long)]
    pub url: Option<String>,

    /// Stop (and pause the job) after this many scroll cycles
    #[arg(long)]
    pub max_cycles: Option<u32>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}
