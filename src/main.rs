use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use url::Url;

use airwave::{
    Broadcaster, DEFAULT_BATCH_SIZE, Episode, Feed, FeedError, JsonFileStore, Library, LiveChannel,
    ProgressStore, ReqwestClient, reveal,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static RADIO: Emoji<'_, '_> = Emoji("📻 ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");
static CHECK: Emoji<'_, '_> = Emoji("☑ ", "[x] ");
static UNCHECKED: Emoji<'_, '_> = Emoji("☐ ", "[ ] ");

/// Aggregate podcast feeds and live radio streams into one place
#[derive(Parser, Debug)]
#[command(name = "airwave")]
#[command(about = "Aggregate podcast feeds and live radio streams into one place")]
#[command(version)]
struct Args {
    /// Path to the store file (defaults to the platform data directory)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a podcast feed
    Add {
        /// Feed URL
        url: String,
    },

    /// Unsubscribe from a podcast feed
    Remove {
        /// Feed URL
        url: String,
    },

    /// Fetch all feeds and list their episodes
    List {
        /// Show every episode instead of the first batch
        #[arg(short, long)]
        all: bool,
    },

    /// Mark an episode as played or unplayed
    Mark {
        /// Feed URL the episode belongs to
        feed: String,
        /// Episode (enclosure) URL
        episode: String,
        /// Unmark instead of mark
        #[arg(long)]
        unplayed: bool,
    },

    /// Manage live channels
    Channel {
        #[command(subcommand)]
        command: ChannelCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ChannelCommand {
    /// Add a live channel
    Add {
        name: String,
        url: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Remove a live channel by URL
    Remove { url: String },

    /// List live channels
    List,
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airwave")
        .join("store.json")
}

fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hrs = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    if hrs > 0 {
        format!("{hrs}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

async fn print_feed(
    feed: &Feed,
    progress_store: &ProgressStore<JsonFileStore>,
    show_all: bool,
) -> Result<()> {
    let date = feed
        .latest_date
        .map(|d| d.format("%b %e, %Y").to_string())
        .unwrap_or_default();

    println!(
        "\n{}{}  {}",
        MICROPHONE,
        feed.title.bold(),
        format!("{} episodes • {}", feed.episode_count(), date).dimmed()
    );

    let played = progress_store.played_for_feed(&feed.id).await?;
    let batch_size = if show_all {
        feed.episode_count().max(1)
    } else {
        DEFAULT_BATCH_SIZE
    };
    let page = reveal(&feed.episodes, 0, batch_size, |e| played.contains(&e.id));

    for episode in page.shown {
        print_episode(episode, &played, progress_store).await?;
    }
    if page.has_more {
        println!("  {}", format!("… and {} more", page.remaining.len()).dimmed());
    }
    Ok(())
}

async fn print_episode(
    episode: &Episode,
    played: &std::collections::BTreeSet<String>,
    progress_store: &ProgressStore<JsonFileStore>,
) -> Result<()> {
    let mark = if played.contains(&episode.id) {
        CHECK
    } else {
        UNCHECKED
    };

    let position = match progress_store.progress(&episode.id).await? {
        Some(p) => {
            let total = p
                .duration
                .map(format_time)
                .unwrap_or_else(|| "--:--".to_string());
            format!("{}/{}", format_time(p.current_time), total)
        }
        None => String::new(),
    };

    let date = episode
        .published_at
        .map(|d| d.format("%b %e, %Y").to_string())
        .unwrap_or_default();

    println!(
        "  {}{}  {}",
        mark,
        episode.title,
        format!("{position} {date}").trim().dimmed()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store_path = args.store.unwrap_or_else(default_store_path);

    let backing = Arc::new(JsonFileStore::new(store_path));
    let library = Library::new(Arc::clone(&backing), Broadcaster::default());
    let progress_store = ProgressStore::new(Arc::clone(&backing));
    let client = ReqwestClient::new();

    match args.command {
        Command::Add { url } => {
            let parsed = Url::parse(&url).context("invalid feed URL")?;

            // Fetch before subscribing so a broken URL is caught here
            let feed = airwave::fetch_feed(&client, parsed.as_str())
                .await
                .with_context(|| format!("could not load feed {url}"))?;

            if library.add_feed(&parsed).await? {
                println!(
                    "{SUCCESS}Subscribed to {} ({} episodes)",
                    feed.title.bold(),
                    feed.episode_count()
                );
            } else {
                println!("{FAILURE}Already subscribed to {url}");
            }
        }

        Command::Remove { url } => {
            if library.remove_feed(&url).await? {
                println!("{SUCCESS}Unsubscribed from {url}");
            } else {
                println!("{FAILURE}Not subscribed to {url}");
            }
        }

        Command::List { all } => {
            let feeds = library.feeds().await?;
            let channels = library.channels().await?;

            if feeds.is_empty() && channels.is_empty() {
                println!("Nothing here yet. Add a feed with `airwave add <url>`.");
                return Ok(());
            }

            for (url, result) in library.refresh_all(&client).await? {
                match result {
                    Ok(feed) => print_feed(&feed, &progress_store, all).await?,
                    // One broken feed never hides the others
                    Err(FeedError::Unreachable { .. }) => {
                        println!("\n{CROSS}{}  {}", url.bold(), "unreachable".red())
                    }
                    Err(e) => println!("\n{CROSS}{}  {}", url.bold(), e.to_string().red()),
                }
            }

            if !channels.is_empty() {
                println!("\n{}", "Live channels".bold());
                for channel in channels {
                    println!(
                        "  {}{}  {}",
                        RADIO,
                        channel.name,
                        channel.description.dimmed()
                    );
                }
            }
        }

        Command::Mark {
            feed,
            episode,
            unplayed,
        } => {
            progress_store
                .set_played(&feed, &episode, !unplayed)
                .await?;
            let verb = if unplayed { "unplayed" } else { "played" };
            println!("{SUCCESS}Marked as {verb}");
        }

        Command::Channel { command } => match command {
            ChannelCommand::Add {
                name,
                url,
                description,
            } => {
                Url::parse(&url).context("invalid channel URL")?;
                if library
                    .add_channel(LiveChannel::new(name.clone(), url, description))
                    .await?
                {
                    println!("{SUCCESS}Added channel {}", name.bold());
                } else {
                    println!("{FAILURE}A channel with that URL already exists");
                }
            }

            ChannelCommand::Remove { url } => {
                if library.remove_channel(&url).await? {
                    println!("{SUCCESS}Removed channel");
                } else {
                    println!("{FAILURE}No channel with that URL");
                }
            }

            ChannelCommand::List => {
                let channels = library.channels().await?;
                if channels.is_empty() {
                    println!("No live channels. Add one with `airwave channel add <name> <url>`.");
                }
                for channel in channels {
                    println!(
                        "{}{}  {}\n  {}",
                        RADIO,
                        channel.name.bold(),
                        channel.description.dimmed(),
                        channel.url.dimmed()
                    );
                }
            }
        },
    }

    Ok(())
}
