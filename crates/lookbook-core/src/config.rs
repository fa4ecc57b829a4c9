use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::call::CallPolicy;
use crate::error::{Error, Result};

const ENV_PREFIX: &str = "APP_";

/// Layered settings: `config.toml`, the `RUST_ENV` overlay, then `APP_*` variables.
pub struct Config {
    figment: Figment,
}

fn overlay_file(env_name: &str) -> Option<&'static str> {
    match env_name {
        "dev" | "development" => Some("config.dev.toml"),
        "prod" | "production" => Some("config.prod.toml"),
        "test" | "testing" => Some("config.test.toml"),
        _ => None,
    }
}

impl Config {
    /// Read settings from the working directory. Production refuses to start
    /// with an invalid `[search]` section instead of failing on first request.
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let mut layers = Figment::new().merge(Toml::file("config.toml"));
        if let Some(file) = overlay_file(&env_name) {
            layers = layers.merge(Toml::file(file));
        }
        let config = Self::with_env_overrides(layers);
        if matches!(env_name.as_str(), "prod" | "production") {
            config.search().context("validating [search] for production")?;
        }
        Ok(config)
    }

    /// Load a single TOML file, still honoring `APP_*` overrides.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::with_env_overrides(Figment::new().merge(Toml::file(path))))
    }

    fn with_env_overrides(layers: Figment) -> Self {
        Self { figment: layers.merge(Env::prefixed(ENV_PREFIX).split("__")) }
    }

    pub fn get<T: DeserializeOwned>(&self, section: &str) -> anyhow::Result<T> {
        self.figment.extract_inner(section).with_context(|| format!("reading config section [{section}]"))
    }

    /// Like `get`, but an absent section yields `T::default()`.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, section: &str) -> anyhow::Result<T> {
        if self.figment.contains(section) { self.get(section) } else { Ok(T::default()) }
    }

    pub fn search(&self) -> anyhow::Result<SearchConfig> {
        let search: SearchConfig = self.get_or_default("search")?;
        search.validate()?;
        Ok(search)
    }

    pub fn data(&self) -> anyhow::Result<DataConfig> { self.get_or_default("data") }

    pub fn llm(&self) -> anyhow::Result<LlmConfig> { self.get_or_default("llm") }

    pub fn embedding(&self) -> anyhow::Result<EmbeddingConfig> { self.get_or_default("embedding") }
}

/// How raw similarity scores are mapped onto [0, 1] before fusion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// Provider-reported similarity clamped to [0, 1].
    #[default]
    Clamp,
    /// Clamped score divided by the modality's best clamped score in one
    /// fusion call, so each modality tops out at 1.0.
    MaxScale,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub planner_ms: u64,
    pub embed_ms: u64,
    pub index_ms: u64,
    pub metadata_ms: u64,
    pub summary_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { planner_ms: 8_000, embed_ms: 5_000, index_ms: 5_000, metadata_ms: 5_000, summary_ms: 8_000 }
    }
}

/// Immutable search settings injected into every pipeline stage at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub max_refined_queries: usize,
    pub default_text_weight: f32,
    pub history_turns: usize,
    pub max_query_chars: usize,
    pub filter_overfetch: usize,
    pub normalization: ScoreNormalization,
    pub transient_retries: u32,
    pub timeouts: TimeoutConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 20,
            max_top_k: 100,
            max_refined_queries: 5,
            default_text_weight: 0.5,
            history_turns: 3,
            max_query_chars: 1000,
            filter_overfetch: 5,
            normalization: ScoreNormalization::Clamp,
            transient_retries: 1,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_top_k == 0 {
            return Err(Error::InvalidConfig("search.max_top_k must be positive".into()));
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(Error::InvalidConfig(format!(
                "search.default_top_k must be in 1..={}, got {}",
                self.max_top_k, self.default_top_k
            )));
        }
        if self.max_refined_queries == 0 {
            return Err(Error::InvalidConfig("search.max_refined_queries must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.default_text_weight) {
            return Err(Error::InvalidConfig(format!(
                "search.default_text_weight must be in [0, 1], got {}",
                self.default_text_weight
            )));
        }
        if self.filter_overfetch == 0 {
            return Err(Error::InvalidConfig("search.filter_overfetch must be positive".into()));
        }
        let t = &self.timeouts;
        if [t.planner_ms, t.embed_ms, t.index_ms, t.metadata_ms, t.summary_ms].contains(&0) {
            return Err(Error::InvalidConfig("search.timeouts must all be positive".into()));
        }
        Ok(())
    }

    fn policy(&self, ms: u64) -> CallPolicy {
        CallPolicy::new(Duration::from_millis(ms), self.transient_retries)
    }

    pub fn planner_policy(&self) -> CallPolicy { self.policy(self.timeouts.planner_ms) }
    pub fn embed_policy(&self) -> CallPolicy { self.policy(self.timeouts.embed_ms) }
    pub fn index_policy(&self) -> CallPolicy { self.policy(self.timeouts.index_ms) }
    pub fn metadata_policy(&self) -> CallPolicy { self.policy(self.timeouts.metadata_ms) }
    pub fn summary_policy(&self) -> CallPolicy { self.policy(self.timeouts.summary_ms) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub lancedb_dir: String,
    pub text_table: String,
    pub image_table: String,
    pub catalog_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            lancedb_dir: "../dev_data/indexes/lancedb".to_string(),
            text_table: "text_vectors".to_string(),
            image_table: "image_vectors".to_string(),
            catalog_path: "../dev_data/products.json".to_string(),
        }
    }
}

impl DataConfig {
    pub fn lancedb_path(&self) -> PathBuf { expand_path(&self.lancedb_dir) }
    pub fn catalog_file(&self) -> PathBuf { expand_path(&self.catalog_path) }

    /// Anchor relative data paths at `base`, usually the config file's directory.
    pub fn relative_to(self, base: &Path) -> Self {
        let anchor = |p: &str| resolve_path(base, p).to_string_lossy().into_owned();
        Self { lancedb_dir: anchor(&self.lancedb_dir), catalog_path: anchor(&self.catalog_path), ..self }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_dir: Option<String>,
    pub model_id: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { model_dir: None, model_id: "openai/clip-vit-base-patch32".to_string() }
    }
}

/// `~` and `$VAR`/`${VAR}` expansion. Unknown variables leave the string
/// as written apart from the tilde.
pub fn expand_path(raw: impl AsRef<str>) -> PathBuf {
    let raw = raw.as_ref();
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

pub fn resolve_path(base: &Path, raw: impl AsRef<str>) -> PathBuf {
    let path = expand_path(raw);
    if path.is_relative() { base.join(path) } else { path }
}
