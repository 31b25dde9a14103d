//! Layered configuration and path helpers.
//!
//! Uses Figment to merge `refdex.toml` + `refdex.<env>.toml` + `REFDEX_*` env vars
//! (`__` separates nested keys, e.g. `REFDEX_EMBEDDING__REGION`).
//! `expand_path` expands `~` and `${VAR}` in configured paths.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunking::ChunkingConfig;
use crate::error::{Error, Result};

pub const DEFAULT_DATA_DIR: &str = "~/.local/share/refdex";

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Loads configuration files from the current directory.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Loads `refdex.toml` and the `RUST_ENV` overlay from `dir`, then env vars.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("refdex.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("refdex.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("refdex.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("refdex.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("REFDEX_").split("__"));

        Ok(Self { figment })
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings =
            self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Typed view of the merged configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub data_dir: String,
    pub chunking: ChunkingConfig,
    pub search: SearchSettings,
    pub embedding: EmbeddingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            chunking: ChunkingConfig::default(),
            search: SearchSettings::default(),
            embedding: EmbeddingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchSettings {
    pub top_k: usize,
    pub context_lines: usize,
    pub max_fragments: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { top_k: 10, context_lines: 3, max_fragments: crate::fragments::DEFAULT_MAX_FRAGMENTS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Concurrent embedding requests during bulk indexing.
    pub workers: usize,
    pub region: String,
    /// Overrides the `https://bedrock-runtime.<region>.amazonaws.com` base URL.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub use_fake_embeddings: bool,
    pub show_progress: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, |n| n.get().min(8)),
            region: "us-east-1".to_string(),
            endpoint: None,
            api_key: None,
            use_fake_embeddings: false,
            show_progress: false,
        }
    }
}

impl Settings {
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embedding.workers == 0 {
            return Err(Error::InvalidConfig("embedding.workers must be at least 1".into()));
        }
        if self.search.top_k == 0 {
            return Err(Error::InvalidConfig("search.top_k must be at least 1".into()));
        }
        Ok(())
    }

    /// Data directory with `~` and environment variables expanded.
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
