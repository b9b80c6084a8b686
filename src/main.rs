mod binder;
mod categorize;
mod error;
mod nav;
mod part;
mod reader;
mod settings;
mod store;
mod text;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use categorize::{RunOptions, Strategy};
use nav::NavIndex;
use settings::{Settings, StoreKind};
use store::{JsonDirStore, PartStore, SqliteStore};
use text::{Diacritics, Normalizer};

const IMPORT_CHUNK: u32 = 500;

#[derive(Parser)]
#[command(name = "hadith_indexer", about = "Bind hadith parts to their book and chapter")]
struct Cli {
    /// Settings file to use instead of ./hadith_indexer.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Storage backend (overrides HADITH_STORE)
    #[arg(long, global = true, value_enum)]
    store: Option<StoreKind>,
    /// Directory of raw `<id>.json` parts
    #[arg(long, global = true)]
    parts_dir: Option<PathBuf>,
    /// Directory for categorized `<id>.json` records
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// SQLite database path
    #[arg(long = "db", global = true)]
    db_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a directory of raw parts into the SQLite store
    Import,
    /// Bind every content part to its book and chapter
    Categorize {
        /// Navigation tree JSON; without it headers are inferred from the parts
        #[arg(long)]
        nav: Option<PathBuf>,
        /// Continue from the last checkpoint
        #[arg(long)]
        resume: bool,
        /// Max parts to categorize in this run
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },
    /// Show categorization statistics
    Stats,
    /// Print one categorized record
    Show { id: u32 },
    /// Find categorized parts by text, ignoring diacritics
    Search {
        query: String,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let loaded = Settings::load(cli.config.as_deref()).context("loading settings")?;
    let settings = apply_overrides(loaded, &cli);
    info!(store = ?settings.store, "settings loaded");

    let result = match cli.command {
        Commands::Import => import(&settings),
        Commands::Categorize { nav, resume, limit } => {
            let normalizer = load_normalizer(&settings)?;
            let strategy = match nav {
                Some(path) => Strategy::Navigation(
                    NavIndex::load(&path)
                        .with_context(|| format!("loading navigation tree {}", path.display()))?,
                ),
                None => Strategy::Sequential,
            };
            let opts = RunOptions {
                resume,
                limit,
                chunk_size: settings.chunk_size,
                checkpoint_every: settings.checkpoint_every,
            };
            let mut store = open_store(&settings)?;
            let pb = progress_bar(0, "categorize")?;
            let stats = categorize::run(store.as_mut(), &normalizer, &strategy, &opts, &pb);
            pb.finish_and_clear();
            let stats = stats?;
            println!(
                "Categorized parts {}..{} of {} ({} headers, {} content) with {} strategy.",
                stats.first_id,
                stats.last_id,
                stats.total,
                stats.headers,
                stats.content,
                strategy.name()
            );
            println!("Books: {}  Chapters: {}", stats.books, stats.chapters);
            if stats.double_writes > 0 {
                println!("Chapters opening on a content part: {}", stats.double_writes);
            }
            if !stats.finished {
                println!("Stopped early. Run 'categorize --resume' to continue.");
            }
            Ok(())
        }
        Commands::Stats => {
            let store = open_store(&settings)?;
            let s = store.stats()?;
            println!("Parts:       {}", s.parts);
            println!("Categorized: {}", s.categorized);
            println!("Headers:     {}", s.headers);
            println!("Content:     {}", s.content);
            println!("Unbound:     {}", s.unbound);
            match s.checkpoint {
                Some(next) => println!("Checkpoint:  next part {}", next),
                None => println!("Checkpoint:  none"),
            }
            Ok(())
        }
        Commands::Show { id } => {
            let store = open_store(&settings)?;
            match store.read_categorized(id)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("Part {} is not categorized yet.", id),
            }
            Ok(())
        }
        Commands::Search { query, limit } => {
            let normalizer = load_normalizer(&settings)?;
            let needle = normalizer.strip_diacritics(text::sanitize(&query).trim());
            if needle.is_empty() {
                anyhow::bail!("search query is empty after normalization");
            }
            let store = open_store(&settings)?;
            let hits = store.search(&needle, limit)?;
            if hits.is_empty() {
                println!("No parts match.");
                return Ok(());
            }
            println!("{:>6} | {:>5} | {:>5} | {:<8} | {}", "Part", "Book", "Chap", "Kind", "Text");
            println!("{}", "-".repeat(90));
            for r in &hits {
                let book = r.book.as_ref().map(|b| b.id.to_string()).unwrap_or_else(|| "-".into());
                let chapter = r.chapter.as_ref().map(|c| c.id.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:>6} | {:>5} | {:>5} | {:<8} | {}",
                    r.id,
                    book,
                    chapter,
                    r.kind().as_str(),
                    snippet(&r.no_tashkeel_content, 8)
                );
            }
            println!("\n{} parts", hits.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(kind) = cli.store {
        settings.store = kind;
    }
    if let Some(dir) = &cli.parts_dir {
        settings.parts_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        settings.output_dir = dir.clone();
    }
    if let Some(path) = &cli.db_path {
        settings.db_path = path.clone();
    }
    settings
}

fn load_normalizer(settings: &Settings) -> anyhow::Result<Normalizer> {
    let diacritics = match &settings.diacritics_path {
        Some(path) => Diacritics::from_file(path)
            .with_context(|| format!("loading diacritics from {}", path.display()))?,
        None => Diacritics::embedded()?,
    };
    Ok(Normalizer::new(diacritics))
}

fn open_store(settings: &Settings) -> anyhow::Result<Box<dyn PartStore>> {
    let store: Box<dyn PartStore> = match settings.store {
        StoreKind::Sqlite => Box::new(
            SqliteStore::open(&settings.db_path)
                .with_context(|| format!("opening {}", settings.db_path.display()))?,
        ),
        StoreKind::Json => Box::new(
            JsonDirStore::open(&settings.parts_dir, &settings.output_dir)
                .with_context(|| format!("opening {}", settings.parts_dir.display()))?,
        ),
    };
    Ok(store)
}

fn import(settings: &Settings) -> anyhow::Result<()> {
    let source = JsonDirStore::open(&settings.parts_dir, &settings.output_dir)
        .with_context(|| format!("opening {}", settings.parts_dir.display()))?;
    let mut db = SqliteStore::open(&settings.db_path)
        .with_context(|| format!("opening {}", settings.db_path.display()))?;

    let total = source.part_count()?;
    if total == 0 {
        println!("No parts found in {}.", settings.parts_dir.display());
        return Ok(());
    }
    println!("Importing {} parts into {}...", total, settings.db_path.display());

    let pb = progress_bar(u64::from(total), "import")?;
    let mut imported = 0;
    let mut from = 1;
    while from <= total {
        let to = (from + IMPORT_CHUNK - 1).min(total);
        let parts = source.read_parts(from..=to)?;
        imported += db.import_parts(&parts)?;
        pb.inc(u64::from(to - from + 1));
        from = to + 1;
    }
    pb.finish_and_clear();
    println!("Imported {} parts.", imported);
    Ok(())
}

fn progress_bar(len: u64, prefix: &'static str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len).with_prefix(prefix);
    pb.set_style(
        ProgressStyle::with_template("{prefix:>10} {wide_bar:.green/white} {pos}/{len} parts, eta {eta}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

/// First `words` words of `text` on one line, with a marker when more follow.
fn snippet(text: &str, words: usize) -> String {
    let mut parts = text.split_whitespace();
    let head: Vec<&str> = parts.by_ref().take(words).collect();
    match parts.next() {
        Some(_) => format!("{} …", head.join(" ")),
        None => head.join(" "),
    }
}

fn elapsed_label(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs % 3600 / 60) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, m) => format!("{}m{:02}s", m, secs % 60),
        (h, m) => format!("{}h{:02}m", h, m),
    }
}
