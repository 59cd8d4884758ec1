use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use gleaner::config::Config;
use gleaner::crypto::{self, Cipher};
use gleaner::feed::{import_opml, AggregateOptions, Aggregator, HttpFeedSource};
use gleaner::storage::{Database, HistoryRecord};
use gleaner::util::validate_feed_url;

/// Get the config directory path (~/.config/gleaner/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gleaner"))
}

/// Create `dir` if needed and restrict it to the current user.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    // SEC-007: user-only access on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to set directory permissions to 0700");
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "gleaner",
    version,
    about = "Merge RSS/Atom feeds into one reading list"
)]
struct Args {
    /// Config file (default: ~/.config/gleaner/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every subscribed feed and print the merged list
    Aggregate {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
        /// Do not write the result into history
        #[arg(long)]
        no_save: bool,
    },
    /// Print stored history, newest first
    History {
        #[arg(long)]
        json: bool,
    },
    /// Mark an item as read (or unread)
    MarkRead {
        link: String,
        #[arg(long)]
        unread: bool,
    },
    /// Delete all history
    ClearHistory,
    /// Manage subscriptions
    Feeds {
        #[command(subcommand)]
        action: FeedsAction,
    },
    /// Store and read secrets encrypted for this machine
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
    /// Encrypt text for this machine and print the envelope
    Encrypt { text: String },
    /// Decrypt an envelope produced on this machine
    Decrypt { envelope: String },
}

#[derive(Subcommand, Debug)]
enum FeedsAction {
    List,
    Add {
        url: String,
        #[arg(long, default_value = "")]
        category: String,
    },
    Remove {
        url: String,
    },
    /// Import subscriptions from an OPML file
    Import {
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum SecretAction {
    Set { key: String, value: String },
    Get { key: String },
    /// Encrypt a value stored as plaintext by an older release
    Migrate { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stderr keeps stdout clean for --json
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Envelope commands need neither config nor database
    match &args.command {
        Command::Encrypt { text } => {
            println!("{}", crypto::encrypt(text)?);
            return Ok(());
        }
        Command::Decrypt { envelope } => {
            let plaintext = crypto::decrypt(envelope.trim())
                .context("Envelope could not be decrypted on this machine")?;
            println!("{plaintext}");
            return Ok(());
        }
        _ => {}
    }

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => {
            ensure_private_dir(&config_dir)?;
            config_dir.join("gleaner.db")
        }
    };
    let db_path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    let db = Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let result = run(args.command, &config, &db).await;
    db.close().await;
    result
}

async fn run(command: Command, config: &Config, db: &Database) -> Result<()> {
    match command {
        Command::Aggregate { json, no_save } => {
            let feeds = db.list_feeds().await?;
            if feeds.is_empty() {
                eprintln!("No feeds subscribed. Add one with `gleaner feeds add <url>`.");
                return Ok(());
            }

            let source = HttpFeedSource::new(&config.user_agent, config.max_feed_bytes)?;
            let aggregator = Aggregator::new(source, AggregateOptions::from_config(config));
            let aggregation = aggregator.aggregate(&feeds, db, Utc::now()).await?;

            if config.persist_history && !no_save {
                db.upsert_history(&aggregation.to_records())
                    .await
                    .context("Failed to save history")?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&aggregation.items)?);
            } else {
                for item in &aggregation.items {
                    print_entry(item.read, &item.time_since, &item.feed_title, &item.title, &item.link);
                }
            }

            for failure in &aggregation.failures {
                eprintln!("skipped {}: {}", failure.link, failure.error);
            }
        }
        Command::History { json } => {
            let records = db.list_history().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for HistoryRecord {
                    read,
                    time,
                    feed_title,
                    title,
                    link,
                    ..
                } in &records
                {
                    print_entry(*read, time, feed_title, title, link);
                }
            }
        }
        Command::MarkRead { link, unread } => {
            if !db.set_read_state(&link, !unread).await? {
                anyhow::bail!("No history entry for {link}");
            }
        }
        Command::ClearHistory => {
            let removed = db.clear_history().await?;
            println!("Removed {removed} history entries");
        }
        Command::Feeds { action } => run_feeds(action, db).await?,
        Command::Secret { action } => run_secret(action, db).await?,
        Command::Encrypt { .. } | Command::Decrypt { .. } => {}
    }
    Ok(())
}

async fn run_feeds(action: FeedsAction, db: &Database) -> Result<()> {
    match action {
        FeedsAction::List => {
            for feed in db.list_feeds().await? {
                if feed.category.is_empty() {
                    println!("{}", feed.link);
                } else {
                    println!("{}\t[{}]", feed.link, feed.category);
                }
            }
        }
        FeedsAction::Add { url, category } => {
            let url = validate_feed_url(&url).with_context(|| format!("Refusing feed URL {url}"))?;
            db.add_feed(url.as_str(), &category).await?;
            println!("Subscribed to {url}");
        }
        FeedsAction::Remove { url } => {
            if !db.remove_feed(&url).await? {
                anyhow::bail!("Not subscribed to {url}");
            }
        }
        FeedsAction::Import { file } => {
            // SEC-008: resolve symlinks and require a regular file
            let canonical = file
                .canonicalize()
                .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
            if !std::fs::metadata(&canonical)?.is_file() {
                anyhow::bail!("Import path must be a regular file");
            }

            let feeds = import_opml(&canonical).await?;
            let count = db.import_feeds(&feeds).await?;
            println!("Imported {count} feeds from {}", canonical.display());
        }
    }
    Ok(())
}

async fn run_secret(action: SecretAction, db: &Database) -> Result<()> {
    let cipher = Cipher::for_this_machine()?;
    match action {
        SecretAction::Set { key, value } => {
            db.set_protected_setting(&cipher, &key, &value).await?;
        }
        SecretAction::Get { key } => match db.get_protected_setting(&cipher, &key).await? {
            Some(value) => println!("{value}"),
            None => anyhow::bail!("No secret stored under {key}"),
        },
        SecretAction::Migrate { key } => {
            if db.migrate_protected_setting(&cipher, &key).await? {
                println!("Encrypted {key}");
            } else {
                println!("{key} needs no migration");
            }
        }
    }
    Ok(())
}

fn print_entry(read: bool, when: &str, feed_title: &str, title: &str, link: &str) {
    let marker = if read { ' ' } else { '*' };
    println!("{marker} {when:>16}  {feed_title}: {title}");
    println!("  {link}");
}
