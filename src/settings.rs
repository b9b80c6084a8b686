use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Sqlite,
    Json,
}

/// Runtime settings. Defaults, then `hadith_indexer.toml` in the working directory
/// (or the `--config` file), then `HADITH_*` environment variables. CLI flags win over all three.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub store: StoreKind,
    pub parts_dir: PathBuf,
    pub output_dir: PathBuf,
    pub db_path: PathBuf,
    #[serde(default)]
    pub diacritics_path: Option<PathBuf>,
    pub chunk_size: u32,
    pub checkpoint_every: u32,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("store", "sqlite")?
        .set_default("parts_dir", "data/parts")?
        .set_default("output_dir", "data/categorized")?
        .set_default("db_path", "data/hadith.sqlite")?
        .set_default("chunk_size", 500i64)?
        .set_default("checkpoint_every", 100i64)?)
}

impl Settings {
    /// `config` replaces the default `hadith_indexer.toml` lookup and must exist.
    pub fn load(config: Option<&Path>) -> Result<Settings> {
        let file = match config {
            Some(path) => File::from(path),
            None => File::with_name("hadith_indexer").required(false),
        };
        let settings = defaults()?
            .add_source(file)
            .add_source(Environment::with_prefix("HADITH").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
