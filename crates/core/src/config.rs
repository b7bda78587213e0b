use crate::models::methods;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub crawl: CrawlSettings,
    #[serde(default)]
    pub classification: ClassificationSettings,
    #[serde(default)]
    pub inference: InferenceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/harvester.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub cleanup_interval: usize,
    pub adapter_timeout_secs: u64,
    pub model_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_ms: 500,
            cleanup_interval: 5,
            adapter_timeout_secs: 3,
            model_timeout_secs: 8,
            fetch_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationSettings {
    /// Directory of weight-profile TOML files, one profile per file.
    pub profiles_dir: Option<String>,
    /// Directory of extra keyword-table TOML files.
    pub keywords_dir: Option<String>,
    /// Profile selected for crawl runs; the built-in default otherwise.
    pub active_profile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub primary_model: String,
    pub secondary_model: String,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            primary_model: "catalog-classifier-v2".to_string(),
            secondary_model: "catalog-classifier-lite".to_string(),
        }
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

/// One named ensemble tuning. Never mutated; a changed configuration is a
/// new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    pub name: String,
    #[serde(default = "default_weights")]
    pub method_weights: BTreeMap<String, f32>,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
    #[serde(default = "default_memory_limit")]
    pub memory_limit_mb: u64,
    /// Aggregate-confidence boost for resource-constrained profiles,
    /// applied at exactly one point in the ensemble step and capped so the
    /// result never exceeds 1.0.
    #[serde(default)]
    pub quality_factor: Option<f32>,
}

fn default_weights() -> BTreeMap<String, f32> {
    BTreeMap::from([
        (methods::MODEL.to_string(), 0.4),
        (methods::MODEL_LITE.to_string(), 0.0),
        (methods::ENTITY.to_string(), 0.3),
        (methods::KEYWORD.to_string(), 0.3),
    ])
}

fn default_quality_threshold() -> f32 {
    40.0
}

fn default_confidence_threshold() -> f32 {
    0.2
}

fn default_token_limit() -> usize {
    512
}

fn default_memory_limit() -> u64 {
    1024
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            method_weights: default_weights(),
            quality_threshold: default_quality_threshold(),
            confidence_threshold: default_confidence_threshold(),
            token_limit: default_token_limit(),
            memory_limit_mb: default_memory_limit(),
            quality_factor: None,
        }
    }
}

impl WeightConfig {
    pub fn weight(&self, method: &str) -> f32 {
        self.method_weights.get(method).copied().unwrap_or(0.0)
    }

    /// Candidate set used by the optimizer when no profile directory is
    /// configured.
    pub fn builtin_candidates() -> Vec<WeightConfig> {
        let mut model_heavy = WeightConfig {
            name: "model_heavy".to_string(),
            ..Default::default()
        };
        model_heavy.method_weights = BTreeMap::from([
            (methods::MODEL.to_string(), 0.6),
            (methods::MODEL_LITE.to_string(), 0.1),
            (methods::ENTITY.to_string(), 0.15),
            (methods::KEYWORD.to_string(), 0.15),
        ]);

        let mut rules_heavy = WeightConfig {
            name: "rules_heavy".to_string(),
            ..Default::default()
        };
        rules_heavy.method_weights = BTreeMap::from([
            (methods::MODEL.to_string(), 0.1),
            (methods::ENTITY.to_string(), 0.4),
            (methods::KEYWORD.to_string(), 0.5),
        ]);

        let mut constrained = WeightConfig {
            name: "constrained".to_string(),
            token_limit: 256,
            memory_limit_mb: 512,
            quality_factor: Some(1.15),
            ..Default::default()
        };
        constrained.method_weights = BTreeMap::from([
            (methods::ENTITY.to_string(), 0.4),
            (methods::KEYWORD.to_string(), 0.6),
        ]);

        vec![
            WeightConfig::default(),
            model_heavy,
            rules_heavy,
            constrained,
        ]
    }
}

/// Loads every `*.toml` profile in the directory. A missing directory is
/// an empty set, not an error.
pub fn load_profiles(dir: &Path) -> anyhow::Result<Vec<WeightConfig>> {
    let mut profiles = Vec::new();
    if !dir.exists() {
        return Ok(profiles);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) == Some("toml") {
            let content = fs::read_to_string(entry.path())?;
            let profile: WeightConfig = toml::from_str(&content)?;
            profiles.push(profile);
        }
    }
    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(profiles)
}

/// Resolves the active profile by name, falling back to the built-in
/// default. Always returns a fully-populated configuration.
pub fn select_profile(profiles: &[WeightConfig], name: Option<&str>) -> WeightConfig {
    match name {
        Some(wanted) => profiles
            .iter()
            .find(|p| p.name == wanted)
            .cloned()
            .unwrap_or_else(|| {
                tracing::warn!(profile = wanted, "unknown profile, using default");
                WeightConfig::default()
            }),
        None => WeightConfig::default(),
    }
}
