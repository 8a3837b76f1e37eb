use std::path::Path;

use crate::app::{AppContext, DreaderError, Result};
use crate::cli::ScrapeArgs;
use crate::domain::{Channel, ChannelKind, JobStatus, Message, ScrapeJob, Server};
use crate::scraper::{JobController, ScrapeTarget, StopSignal};
use crate::store::Store;

pub fn init_db(ctx: &AppContext, path: &Path) -> Result<()> {
    let servers = ctx.store.list_servers()?.len();
    let channels = ctx.store.list_channels(None)?.len();
    println!("Database ready: {}", path.display());
    println!("  {} servers, {} channels", servers, channels);
    Ok(())
}

pub fn confirm_reset(path: &Path, yes: bool) -> Result<()> {
    if !yes {
        return Err(DreaderError::Other(format!(
            "Refusing to delete {} without --yes",
            path.display()
        )));
    }
    Ok(())
}

pub fn build_target(args: &ScrapeArgs) -> Result<ScrapeTarget> {
    let kind: ChannelKind = args.kind.parse().map_err(DreaderError::Config)?;

    let server = Server::new(
        args.server_id.clone(),
        args.server_name
            .clone()
            .unwrap_or_else(|| args.server_id.clone()),
    );
    let channel = Channel::new(
        args.channel_id.clone(),
        args.server_id.clone(),
        args.channel_name
            .clone()
            .unwrap_or_else(|| args.channel_id.clone()),
        kind,
    );

    let target = ScrapeTarget::new(server, channel);
    match args.url {
        Some(ref url) => {
            url::Url::parse(url)?;
            Ok(target.with_url(url.clone()))
        }
        None => Ok(target),
    }
}

pub async fn scrape(ctx: &AppContext, args: &ScrapeArgs) -> Result<()> {
    let target = build_target(args)?;

    let mut config = ctx.config.scraper.clone();
    if let Some(max_cycles) = args.max_cycles {
        config.max_cycles = max_cycles;
    }
    if args.headed {
        config.headless = false;
    }
    if config.profile_dir.is_none() {
        eprintln!("Warning: no [scraper] profile_dir configured; the browser will not be logged in");
    }

    let orchestrator = ctx.orchestrator(config);
    let stop = StopSignal::new();

    let ctrl_c = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Pausing after the current cycle...");
                stop.pause();
            }
        })
    };

    println!("Scraping {}", target.channel.display_name());
    let result = orchestrator.run(&target, &stop).await;
    ctrl_c.abort();

    if let Err(DreaderError::JobConflict { job_id, .. }) = &result {
        eprintln!(
            "If no other dreader process is scraping this channel, run `dreader cancel-job {}`",
            job_id
        );
    }
    let job = result?;
    println!("{}", format_job(&job));

    match job.status {
        JobStatus::Failed => Err(DreaderError::Other(format!(
            "Scrape job {} failed",
            job.id
        ))),
        JobStatus::Paused => {
            println!("Run the same command again to resume.");
            Ok(())
        }
        _ => Ok(()),
    }
}

pub fn list_servers(ctx: &AppContext) -> Result<()> {
    let servers = ctx.store.list_servers()?;

    if servers.is_empty() {
        println!("No servers");
        return Ok(());
    }

    for server in servers {
        let channels = ctx.store.list_channels(Some(&server.id))?.len();
        println!("{} ({} channels)\n  {}", server.name, channels, server.id);
    }

    Ok(())
}

pub fn list_channels(ctx: &AppContext, server_id: Option<&str>) -> Result<()> {
    let channels = ctx.store.list_channels(server_id)?;

    if channels.is_empty() {
        println!("No channels");
        return Ok(());
    }

    for channel in channels {
        let count = ctx.store.count_messages(&channel.id)?;
        println!(
            "{} [{}] ({} messages)\n  {} in server {}",
            channel.display_name(),
            channel.kind,
            count,
            channel.id,
            channel.server_id
        );
    }

    Ok(())
}

pub fn list_messages(ctx: &AppContext, channel_id: &str, limit: usize) -> Result<()> {
    ctx.store
        .get_channel(channel_id)?
        .ok_or_else(|| DreaderError::ChannelNotFound(channel_id.to_string()))?;

    let messages = ctx.store.list_messages(channel_id, Some(limit))?;

    if messages.is_empty() {
        println!("No messages");
        return Ok(());
    }

    // Oldest first, like the client shows them
    for message in messages.iter().rev() {
        println!("{}", format_message(message));
    }

    Ok(())
}

pub fn list_threads(ctx: &AppContext, channel_id: &str) -> Result<()> {
    let threads = ctx.store.list_threads(channel_id)?;

    if threads.is_empty() {
        println!("No threads");
        return Ok(());
    }

    for thread in threads {
        println!(
            "{} ({} messages, last {})",
            thread.thread_id,
            thread.message_count,
            thread.last_activity.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

pub fn list_jobs(ctx: &AppContext, channel_id: Option<&str>) -> Result<()> {
    let jobs = ctx.store.list_jobs(channel_id)?;

    if jobs.is_empty() {
        println!("No scrape jobs");
        return Ok(());
    }

    for job in jobs {
        println!("{}", format_job(&job));
    }

    Ok(())
}

pub fn cancel_job(ctx: &AppContext, job_id: i64) -> Result<()> {
    let job = JobController::cancel(ctx.store.as_ref(), job_id)?;
    println!("{}", format_job(&job));
    if job.cursor().is_some() {
        println!("The next scrape of this channel continues from here.");
    }
    Ok(())
}

pub fn remove_channel(ctx: &AppContext, channel_id: &str) -> Result<()> {
    let channel = ctx
        .store
        .get_channel(channel_id)?
        .ok_or_else(|| DreaderError::ChannelNotFound(channel_id.to_string()))?;

    let count = ctx.store.count_messages(channel_id)?;
    ctx.store.delete_channel(channel_id)?;
    println!(
        "Removed channel: {} ({} messages)",
        channel.display_name(),
        count
    );
    Ok(())
}

fn format_message(message: &Message) -> String {
    let mut line = format!(
        "[{}] {}: {}",
        message.timestamp.format("%Y-%m-%d %H:%M"),
        message.author_name,
        message.content
    );
    if message.is_edited() {
        line.push_str(" (edited)");
    }
    for attachment in &message.attachments {
        let name = attachment.filename.as_deref().unwrap_or(&attachment.url);
        line.push_str(&format!("\n    + {}", name));
    }
    if let Some(ref thread_id) = message.thread_id {
        line.push_str(&format!("\n    thread {}", thread_id));
    }
    line
}

fn format_job(job: &ScrapeJob) -> String {
    let mut line = format!(
        "#{} {} {} ({} cycles, {} messages, {} failed attempts)",
        job.id, job.channel_id, job.status, job.cycles, job.messages_seen, job.attempts
    );
    if let Some(cursor) = job.cursor_timestamp {
        line.push_str(&format!("\n  reached {}", cursor.format("%Y-%m-%d %H:%M")));
    }
    if let Some(ref error) = job.error_message {
        let kind = job.error_kind.map(|k| k.as_str()).unwrap_or("error");
        line.push_str(&format!("\n  {}: {}", kind, error));
    }
    if let Some(ref path) = job.screenshot_path {
        line.push_str(&format!("\n  screenshot: {}", path));
    }
    line
}
