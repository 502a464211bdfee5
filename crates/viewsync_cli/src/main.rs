//! viewsync - view-count synchronization driver.
//!
//! Thin wrapper over `viewsync_core`: bootstraps the stores, publishes
//! articles, and runs event batches through the consumer.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use viewsync_core::db::open_db;
use viewsync_core::{
    default_log_level, init_logging, Article, ArticleId, ArticleStore, IndexStore,
    PublishService, Reconciler, SqliteArticleStore, SqliteIndexStore, SyncConfig, SystemClock,
    ViewEvent, ViewEventConsumer,
};

/// viewsync - keep article view counts and the article index in sync
#[derive(Parser, Debug)]
#[command(name = "viewsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database holding both stores
    #[arg(long, env = "VIEWSYNC_DB", default_value = "viewsync.db")]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VIEWSYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "VIEWSYNC_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// JSON file with engine settings
    #[arg(short, long, env = "VIEWSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the empty article index
    Init,

    /// Store one article and add it to the index
    Publish {
        /// Article JSON document
        file: PathBuf,
    },

    /// Process a batch of view events and print the batch response
    Consume {
        /// JSON array of `{"messageId", "body"}` objects or bare id strings
        file: PathBuf,
    },

    /// Print the article index
    ShowIndex,

    /// Print one article
    ShowArticle {
        /// Article id
        id: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        let log_dir = log_dir
            .to_str()
            .context("log directory must be valid UTF-8")?;
        init_logging(level, log_dir).context("failed to initialize logging")?;
    }

    let config = match &cli.config {
        Some(path) => SyncConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SyncConfig::default(),
    };

    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database {}", cli.db.display()))?;
    let articles = SqliteArticleStore::new(&conn);
    let index = SqliteIndexStore::new(&conn);

    match cli.command {
        Commands::Init => {
            let publisher = PublishService::new(&articles, &index, SystemClock, config);
            let created = publisher.init_index()?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Commands::Publish { file } => {
            let article: Article = read_json(&file)?;
            let publisher = PublishService::new(&articles, &index, SystemClock, config);
            let receipt = publisher
                .publish(&article)
                .with_context(|| format!("failed to publish article {}", article.id))?;
            println!(
                "published {} at page {} slot {}",
                article.id, receipt.position.page, receipt.position.slot
            );
        }
        Commands::Consume { file } => {
            let events = parse_events(read_json(&file)?)?;
            let consumer =
                ViewEventConsumer::new(Reconciler::new(&articles, &index, SystemClock, config));
            let report = consumer.process_batch(&events);
            println!("{}", serde_json::to_string_pretty(&report.to_response())?);
            if report.is_aborted() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::ShowIndex => match index.get_index(&config.index_id)? {
            Some(current) => println!("{}", serde_json::to_string_pretty(&current)?),
            None => bail!("article index `{}` does not exist", config.index_id),
        },
        Commands::ShowArticle { id } => {
            let id = ArticleId::parse(&id)?;
            match articles.get_article(&id)? {
                Some(article) => println!("{}", serde_json::to_string_pretty(&article)?),
                None => bail!("article `{id}` does not exist"),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_events(value: Value) -> Result<Vec<ViewEvent>> {
    let Value::Array(items) = value else {
        bail!("event file must contain a JSON array");
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(body) => Ok(ViewEvent::new(body)),
            Value::Number(number) => Ok(ViewEvent::new(number.to_string())),
            other @ Value::Object(_) => {
                serde_json::from_value::<ViewEvent>(other).context("invalid event object")
            }
            other => bail!("unsupported event entry: {other}"),
        })
        .collect()
}
