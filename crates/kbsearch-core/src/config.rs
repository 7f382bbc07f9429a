//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! The `[retrieval]` table is extracted into [`RetrievalSettings`]; every key
//! has a default so an absent table is valid.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        let settings = config.settings()?;
        tracing::debug!(env = %env_name, dimension = settings.default_dimension, "configuration loaded");
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Validated `[retrieval]` settings.
    pub fn settings(&self) -> anyhow::Result<RetrievalSettings> {
        let settings: RetrievalSettings = if self.figment.contains("retrieval") {
            self.get("retrieval")?
        } else {
            RetrievalSettings::default()
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub lancedb_uri: String,
    pub default_dimension: usize,
    pub keyword_drop_ratio: f32,
    pub copy_batch_size: usize,
    pub vector_index_min_rows: usize,
    pub tag_search_default_limit: usize,
    pub document_lookup_max_items: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            lancedb_uri: "~/.kbsearch/lancedb".to_string(),
            default_dimension: 1536,
            keyword_drop_ratio: 0.1,
            copy_batch_size: 500,
            vector_index_min_rows: 256,
            tag_search_default_limit: 20,
            document_lookup_max_items: 10,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<(), Error> {
        if self.default_dimension == 0 {
            return Err(Error::InvalidConfig("default_dimension must be positive".into()));
        }
        if self.copy_batch_size == 0 {
            return Err(Error::InvalidConfig("copy_batch_size must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.keyword_drop_ratio) {
            return Err(Error::InvalidConfig(format!(
                "keyword_drop_ratio must be in [0, 1), got {}",
                self.keyword_drop_ratio
            )));
        }
        if self.tag_search_default_limit == 0 || self.document_lookup_max_items == 0 {
            return Err(Error::InvalidConfig("limits must be positive".into()));
        }
        Ok(())
    }

    /// `lancedb_uri` with `~` and environment variables expanded.
    pub fn lancedb_path(&self) -> PathBuf {
        expand_path(&self.lancedb_uri)
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
