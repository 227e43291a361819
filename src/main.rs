use std::sync::Arc;
use std::time::Duration;

mod cli;
mod config;
mod db;
mod error;
mod extract;
mod ingest;
mod models;
mod scheduler;
mod services;

use cli::{Command, USAGE};
use config::Config;
use db::Repository;
use error::{AppError, Result};
use ingest::{IngestOutcome, Ingestor};
use models::{LinkRecord, LinkSource, LinkUpdate};
use scheduler::NotificationScheduler;
use services::{HttpFetcher, TelegramClient};

const LONG_POLL: Duration = Duration::from_secs(30);
const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(5);
const LIST_LIMIT: usize = 50;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (info by default, RUST_LOG overrides)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let repository = Arc::new(Repository::new(&config.db_path).await?);

    match command {
        Command::Run => run_service(&config, repository).await?,
        Command::Ingest(text) => {
            let ingestor = Ingestor::new(
                repository,
                Arc::new(HttpFetcher::new()?),
                config.fetch_timeout(),
            );
            for outcome in ingestor.ingest_message(&text, LinkSource::Cli).await {
                print_outcome(&outcome);
            }
        }
        Command::List(filter) => {
            for link in repository.list_links(filter, LIST_LIMIT, 0).await? {
                print_link(&link);
            }
        }
        Command::Tags => {
            for tag in repository.all_tags().await? {
                println!("{}", tag);
            }
        }
        Command::Stats => {
            let stats = repository.stats().await?;
            println!(
                "{} links: {} read, {} unread, {} favorites, {} scheduled",
                stats.total, stats.read, stats.unread, stats.favorites, stats.scheduled
            );
        }
        Command::MarkRead(url) => {
            let update = LinkUpdate {
                is_read: Some(true),
                ..Default::default()
            };
            print_link(&update_existing(&repository, &url, update).await?);
        }
        Command::Favorite(url) => {
            let update = LinkUpdate {
                is_favorite: Some(true),
                ..Default::default()
            };
            print_link(&update_existing(&repository, &url, update).await?);
        }
        Command::SetTags { url, tags } => {
            let update = LinkUpdate {
                tags: Some(tags),
                ..Default::default()
            };
            print_link(&update_existing(&repository, &url, update).await?);
        }
        Command::Schedule { url, at } => {
            let update = LinkUpdate {
                scheduled_at: Some(at),
                ..Default::default()
            };
            print_link(&update_existing(&repository, &url, update).await?);
        }
        Command::Delete(url) => {
            if !repository.delete_link(&url).await? {
                return Err(AppError::NotFound(url));
            }
            println!("Deleted {}", url);
        }
        Command::Help => {}
    }

    Ok(())
}

async fn update_existing(repository: &Repository, url: &str, update: LinkUpdate) -> Result<LinkRecord> {
    repository
        .update_link(url, update)
        .await?
        .ok_or_else(|| AppError::NotFound(url.to_string()))
}

/// Starts the reminder loop and the chat listener, then waits for Ctrl-C.
async fn run_service(config: &Config, repository: Arc<Repository>) -> Result<()> {
    let Some(token) = config.telegram_bot_token.as_deref() else {
        tracing::warn!("TELEGRAM_BOT_TOKEN not set; reminders and chat ingestion disabled");
        return Ok(());
    };

    // One client for the whole process, released after the tasks stop.
    let telegram = Arc::new(TelegramClient::new(token)?);
    let mut tasks = Vec::new();

    match config.notification_chat_id.clone() {
        Some(chat_id) => {
            let scheduler = NotificationScheduler::new(
                repository.clone(),
                telegram.clone(),
                chat_id,
                config.poll_interval(),
                config.max_candidates_per_tick,
            );
            tasks.push(tokio::spawn(async move { scheduler.run().await }));
        }
        None => tracing::warn!("NOTIFICATION_CHAT_ID not set, reminders disabled"),
    }

    if config.listen_for_messages {
        let ingestor = Arc::new(Ingestor::new(
            repository.clone(),
            Arc::new(HttpFetcher::new()?),
            config.fetch_timeout(),
        ));
        let listener_client = telegram.clone();
        tasks.push(tokio::spawn(async move {
            listen_for_links(listener_client, ingestor).await
        }));
    }

    if tasks.is_empty() {
        tracing::warn!("Nothing to run");
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    for task in &tasks {
        task.abort();
    }
    for task in tasks {
        let _ = task.await;
    }
    drop(telegram);
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Long-polls the bot for chat messages and ingests any links they carry.
/// Each message is ingested on its own task so polling never waits on a
/// slow page.
async fn listen_for_links(telegram: Arc<TelegramClient>, ingestor: Arc<Ingestor>) {
    tracing::info!("Listening for chat messages");
    let mut offset = None;

    loop {
        let messages = match telegram.get_updates(offset, LONG_POLL).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Failed to poll chat updates: {}", e);
                tokio::time::sleep(LISTEN_RETRY_DELAY).await;
                continue;
            }
        };

        for message in messages {
            offset = Some(message.update_id + 1);
            if message.text.trim().is_empty() {
                continue;
            }
            tracing::debug!(chat_id = message.chat_id, "Processing message");
            ingestor.spawn_message(message.text, LinkSource::Telegram);
        }
    }
}

fn print_outcome(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Inserted(link) => println!("saved      {} ({})", link.url, link.title),
        IngestOutcome::SkippedDuplicate { url } => println!("duplicate  {}", url),
        IngestOutcome::Error { url, reason } => println!("error      {}: {}", url, reason),
    }
}

fn print_link(link: &LinkRecord) {
    let read = if link.is_read { 'R' } else { '-' };
    let favorite = if link.is_favorite { '*' } else { '-' };
    let scheduled = link
        .scheduled_at
        .map(|at| format!(" @ {}", at.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_default();
    println!(
        "[{}{}] {} ({}, {} min){}\n      {}",
        read, favorite, link.title, link.domain, link.reading_time, scheduled, link.url
    );
    if !link.tags.is_empty() {
        println!("      tags: {}", link.tags.join(", "));
    }
}
