//! # Blog Harvest CLI (`harvest`)
//!
//! The `harvest` binary drives the ingestion pipeline: database setup,
//! source listing, scraping, classification previews, and exports.
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite database and run schema migrations |
//! | `harvest sources` | List registered sources and their pagination settings |
//! | `harvest scrape <key\|all>` | Scrape, enrich, and store articles |
//! | `harvest classify "<title>"` | Show the category and tags a post would get |
//! | `harvest stats` | Article counts and embedding coverage |
//! | `harvest export` | JSON export of embedded articles |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use blog_harvest::{classify, config, export, logging, migrate, scrape, sources, stats};

/// Blog Harvest CLI: scrape engineering blogs into an embedded article store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Blog Harvest: an ingestion pipeline for engineering blogs",
    version,
    long_about = "Blog Harvest pages through engineering-blog listings, extracts posts, \
    enriches them with tags, a category, and an embedding, and stores them in SQLite keyed by URL."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`. When the file does not exist,
    /// built-in defaults are used with the database at `./data/harvest.sqlite`.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `articles` table. Running it
    /// more than once is safe.
    Init,

    /// List registered sources.
    ///
    /// Shows each source's key, canonical name, pagination style, ceiling,
    /// and whether `scrape all` will include it.
    Sources,

    /// Scrape one source, or every enabled source with `all`.
    ///
    /// Individual source failures are reported in the summary and do not
    /// fail the command; an unknown source key does.
    Scrape {
        /// Source key (e.g. `netflix`, `stripe`) or `all`.
        source: String,

        /// Enrich articles but do not write them.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of posts to process per source.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Classify a post title without scraping.
    Classify {
        title: String,

        #[arg(long)]
        summary: Option<String>,
    },

    /// Show article counts, embedding coverage, and per-source breakdown.
    Stats,

    /// Export all embedded articles as JSON.
    Export {
        /// Output file. Prints to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn load(path: &std::path::Path) -> anyhow::Result<config::Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(config::Config::minimal("./data/harvest.sqlite"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let cfg = load(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Scrape {
            source,
            dry_run,
            limit,
        } => {
            scrape::run_scrape(&cfg, &source, dry_run, limit).await?;
        }
        Commands::Classify { title, summary } => {
            classify::run_classify(&cfg, &title, summary.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
    }

    Ok(())
}
