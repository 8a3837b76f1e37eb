use clap::Parser;

use dreader::app::AppContext;
use dreader::cli::{commands, Cli, Commands};
use dreader::config::Config;
use dreader::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Flushes the JSON log file on exit
    let _guard = logging::init(&config.logging)?;

    let db_path = match cli.db {
        Some(ref path) => path.clone(),
        None => AppContext::default_db_path()?,
    };

    match cli.command {
        Commands::InitDb => {
            let ctx = AppContext::new(Some(db_path.clone()), config)?;
            commands::init_db(&ctx, &db_path)?;
        }
        Commands::ResetDb { yes } => {
            commands::confirm_reset(&db_path, yes)?;
            let ctx = AppContext::reset(Some(db_path.clone()), config)?;
            println!("Database reset");
            commands::init_db(&ctx, &db_path)?;
        }
        Commands::Scrape(ref args) => {
            let ctx = AppContext::new(Some(db_path), config)?;
            commands::scrape(&ctx, args).await?;
        }
        Commands::Servers => {
            let ctx = AppContext::new(Some(db_path), config)?;
            commands::list_servers(&ctx)?;
        }
        Commands::Channels { ref server } => {
            let ctx = AppContext::new(Some(db_path), config)?;
            commands::list_channels(&ctx, server.as_deref())?;
        }
        Commands::Messages { ref channel, limit } => {
            let ctx = AppContext::new(Some(db_path), config)?;
            commands::list_messages(&ctx, channel, limit)?;
        }
        Commands::Threads { ref channel } => {
            let ctx = AppContext::new(Some(db_path), config)?;
            commands::list_threads(&ctx, channel)?;
        }
        Commands::Jobs { ref channel } => {
            let ctx = AppContext::new(Some(db_path), config)?;
            commands::list_jobs(&ctx, channel.as_deref())?;
        }
        Commands::CancelJob { id } => {
            let ctx = AppContext::new(Some(db_path), config)?;
            commands::cancel_job(&ctx, id)?;
        }
        Commands::RemoveChannel { ref id } => {
            let ctx = AppContext::new(Some(db_path), config)?;
            commands::remove_channel(&ctx, id)?;
        }
    }

    Ok(())
}
