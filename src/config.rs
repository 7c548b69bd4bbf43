use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub index: IndexConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub index_settings: IndexSettingsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection string. Overridden by `DATABASE_URL` if set.
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Base URL of the Meilisearch instance (e.g. `http://localhost:7700`).
    pub host: String,
    /// API key. Overridden by `MEILI_API_KEY` if set; empty disables auth.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_index_name")]
    pub name: String,
}

fn default_index_name() -> String {
    "resources".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Seconds between scheduled FullSync passes.
    #[serde(default = "default_full_interval_secs")]
    pub full_interval_secs: u64,
    /// Seconds between scheduled RatingsSync passes.
    #[serde(default = "default_ratings_interval_secs")]
    pub ratings_interval_secs: u64,
    /// Maximum document ids fetched from the index per FullSync. Documents
    /// beyond this cap escape orphan detection until the index shrinks.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            full_interval_secs: default_full_interval_secs(),
            ratings_interval_secs: default_ratings_interval_secs(),
            list_page_size: default_list_page_size(),
        }
    }
}

fn default_full_interval_secs() -> u64 {
    3600
}
fn default_ratings_interval_secs() -> u64 {
    900
}
fn default_list_page_size() -> usize {
    10_000
}

/// Tunables applied to the remote index via `configure_schema`. The
/// searchable/filterable/sortable attribute lists are fixed by the document
/// shape and live in [`crate::index::IndexSettings`]; only the leniency
/// knobs are configurable.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexSettingsConfig {
    /// Synonym table: term → equivalent terms. Defaults to the common
    /// subject abbreviations; an explicit table in the file replaces it.
    #[serde(default = "default_synonyms")]
    pub synonyms: HashMap<String, Vec<String>>,
    /// Minimum word length before one typo is tolerated.
    #[serde(default = "default_min_word_size_one_typo")]
    pub min_word_size_one_typo: u32,
    /// Minimum word length before two typos are tolerated.
    #[serde(default = "default_min_word_size_two_typos")]
    pub min_word_size_two_typos: u32,
}

impl Default for IndexSettingsConfig {
    fn default() -> Self {
        Self {
            synonyms: default_synonyms(),
            min_word_size_one_typo: default_min_word_size_one_typo(),
            min_word_size_two_typos: default_min_word_size_two_typos(),
        }
    }
}

fn default_synonyms() -> HashMap<String, Vec<String>> {
    [
        ("math", vec!["mathematics", "maths"]),
        ("bio", vec!["biology"]),
        ("chem", vec!["chemistry"]),
        ("phys", vec!["physics"]),
        ("eng", vec!["english"]),
        ("lit", vec!["literature"]),
        ("geo", vec!["geography"]),
        ("hist", vec!["history"]),
    ]
    .into_iter()
    .map(|(term, equivalents)| {
        (
            term.to_string(),
            equivalents.into_iter().map(String::from).collect(),
        )
    })
    .collect()
}

fn default_min_word_size_one_typo() -> u32 {
    3
}
fn default_min_word_size_two_typos() -> u32 {
    6
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Deployment environments supply secrets via env, not the file
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Ok(key) = std::env::var("MEILI_API_KEY") {
        config.index.api_key = key;
    }

    if config.database.url.is_empty() {
        anyhow::bail!("database.url must be set (or DATABASE_URL exported)");
    }

    if config.index.host.is_empty() {
        anyhow::bail!("index.host must be set");
    }

    if config.index.name.is_empty() {
        anyhow::bail!("index.name must not be empty");
    }

    if config.sync.list_page_size == 0 {
        anyhow::bail!("sync.list_page_size must be > 0");
    }

    if config.sync.full_interval_secs == 0 || config.sync.ratings_interval_secs == 0 {
        anyhow::bail!("sync intervals must be > 0 seconds");
    }

    if config.index_settings.min_word_size_one_typo > config.index_settings.min_word_size_two_typos
    {
        anyhow::bail!(
            "index_settings.min_word_size_one_typo must not exceed min_word_size_two_typos"
        );
    }

    Ok(config)
}
