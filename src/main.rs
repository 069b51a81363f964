use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use newsdesk::api::{HeadlinesQuery, NewsApiClient, SearchQuery};
use newsdesk::app::{App, AppEvent, Request};
use newsdesk::config::Config;
use newsdesk::preferences::PreferenceManager;
use newsdesk::repository::Repository;
use newsdesk::storage::{Article, Database, PreferenceStore, StoreError};

/// Get the config directory path (~/.config/newsdesk/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsdesk"))
}

/// Create the config directory with user-only permissions.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if config_dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
    tracing::info!(path = %config_dir.display(), "Created config directory");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "newsdesk",
    about = "News headlines with a local cache, favorites and recommendations"
)]
struct Args {
    /// Config file (default: ~/.config/newsdesk/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file (default: ~/.config/newsdesk/news.db)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Print articles as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Top headlines, from the local cache once it holds articles
    Headlines {
        /// Two-letter country code (default from config)
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Keywords to filter headlines
        #[arg(long, short)]
        query: Option<String>,
        /// Always fetch from the network
        #[arg(long)]
        refresh: bool,
    },
    /// Search all articles (always fetches, results are cached)
    Search {
        query: String,
        /// Oldest publication date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Newest publication date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// List favorite articles
    Favorites,
    /// Toggle the favorite flag of a cached article
    Toggle { url: String },
    /// Headlines matching your stored preferences
    Recommend,
    /// Show or change recommendation preferences
    Prefs {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        keywords: Option<String>,
        /// Forget stored preferences and fall back to the config file
        #[arg(long, conflicts_with_all = ["category", "keywords"])]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays parseable with --json
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;
    tracing::debug!(config = ?config, "Configuration resolved");

    let db_path = match &args.db {
        Some(path) => path.clone(),
        None => {
            ensure_config_dir(&config_dir)?;
            config_dir.join("news.db")
        }
    };

    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        eprintln!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StoreError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of newsdesk appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let preferences = PreferenceManager::new(&config, db.clone());

    let request = match args.command {
        Command::Prefs {
            category,
            keywords,
            reset,
        } => return update_preferences(&preferences, category, keywords, reset).await,
        Command::Headlines {
            country,
            category,
            query,
            refresh,
        } => {
            let query = HeadlinesQuery {
                country: country.unwrap_or_else(|| config.country.clone()),
                category,
                query,
            };
            if refresh {
                Request::RefreshHeadlines(query)
            } else {
                Request::Headlines(query)
            }
        }
        Command::Search { query, from, to } => Request::Search(SearchQuery { query, from, to }),
        Command::Favorites => Request::Favorites,
        Command::Toggle { url } => Request::ToggleFavorite(Article::new(url, "")),
        Command::Recommend => Request::Recommendations,
    };

    let http = reqwest::Client::builder()
        .user_agent(concat!("newsdesk/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let api = NewsApiClient::new(
        http,
        config.base_url.as_deref(),
        config.resolve_api_key().map(SecretString::from),
    )
    .context("Invalid news API configuration")?
    .with_timeout(config.request_timeout());

    let repository = Repository::new(Arc::new(api), Arc::new(db.clone()), Arc::new(preferences))
        .with_cache_policy(config.headlines_cache)
        .with_country(config.country.clone());

    let is_toggle = matches!(request, Request::ToggleFavorite(_));
    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(8);
    let mut app = App::new(repository, event_tx);

    app.dispatch(request);
    while !app.is_idle() {
        let Some(event) = event_rx.recv().await else {
            break;
        };
        app.handle_event(event);
    }

    if let Some(error) = app.last_error.take() {
        anyhow::bail!(error);
    }

    if is_toggle {
        if let Some(status) = &app.status {
            println!("{status}");
        }
    } else {
        render(&app, args.json)?;
    }
    Ok(())
}

async fn update_preferences(
    preferences: &PreferenceManager,
    category: Option<String>,
    keywords: Option<String>,
    reset: bool,
) -> Result<()> {
    if reset {
        preferences.reset().await.context("Failed to reset preferences")?;
    }
    if let Some(category) = category.as_deref() {
        let value = Some(category).filter(|c| !c.trim().is_empty());
        preferences
            .set_category(value)
            .await
            .context("Failed to save category")?;
    }
    if let Some(keywords) = keywords.as_deref() {
        let value = Some(keywords).filter(|k| !k.trim().is_empty());
        preferences
            .set_keywords(value)
            .await
            .context("Failed to save keywords")?;
    }

    let current = preferences
        .user_preferences()
        .await
        .context("Failed to read preferences")?;
    println!(
        "category: {}",
        current.preferred_category.as_deref().unwrap_or("(none)")
    );
    println!(
        "keywords: {}",
        current.preferred_keywords.as_deref().unwrap_or("(none)")
    );
    Ok(())
}

fn render(app: &App, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(&app.articles).context("Failed to encode articles")?;
        println!("{out}");
        return Ok(());
    }

    println!("{} ({})", app.view.label(), app.articles.len());
    for article in &app.articles {
        let marker = if article.is_favorite { "*" } else { " " };
        println!("{marker} {}", article.title);
        if !article.description.is_empty() {
            println!("    {}", article.description);
        }
        println!("    {}", article.url);
    }
    if let Some(status) = &app.status {
        if !app.articles.is_empty() {
            println!();
        }
        println!("{status}");
    }
    Ok(())
}
