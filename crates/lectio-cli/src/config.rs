//! Configuration file management for lectio.
//!
//! Provides a TOML-based config file at `~/.config/lectio/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use lectio_core::PipelineConfig;
use lectio_core::citation::lookup;
use lectio_core::llm::anthropic;
use lectio_db::config::DbConfig;

/// Overrides the model named in the config file.
pub const MODEL_ENV_VAR: &str = "LECTIO_MODEL";
/// Overrides the reference service URL named in the config file.
pub const REFERENCE_URL_ENV_VAR: &str = "LECTIO_REFERENCE_URL";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub references: ReferencesSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReferencesSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Optional overrides of [`PipelineConfig`]; unset keys keep the defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_pause_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_batch_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_ttl_hours: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fallback_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_omitted_optional_fields: Option<usize>,
}

impl PipelineSection {
    /// Apply the overrides present in this section on top of `base`.
    pub fn apply(&self, mut base: PipelineConfig) -> PipelineConfig {
        if let Some(n) = self.day_concurrency {
            base.day_concurrency = n.max(1);
        }
        if let Some(ms) = self.batch_pause_ms {
            base.batch_pause = Duration::from_millis(ms);
        }
        if let Some(secs) = self.planning_timeout_secs {
            base.planning.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.day_timeout_secs {
            base.content.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.review_timeout_secs {
            base.review.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.reference_batch_size {
            base.reference_batch_size = n.max(1);
        }
        if let Some(ms) = self.reference_batch_delay_ms {
            base.reference_batch_delay = Duration::from_millis(ms);
        }
        if let Some(hours) = self.reference_ttl_hours {
            base.reference_ttl = Duration::from_secs(hours * 3600);
        }
        if let Some(enabled) = self.review_enabled {
            base.review_enabled = enabled;
        }
        if let Some(ratio) = self.max_fallback_ratio {
            base.max_fallback_ratio = ratio.clamp(0.0, 1.0);
        }
        if let Some(n) = self.max_omitted_optional_fields {
            base.max_omitted_optional_fields = Some(n);
        }
        base
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the lectio config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/lectio` or `~/.config/lectio`,
/// including on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("lectio");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("lectio")
}

/// Return the path to the lectio config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file at `path`. `Ok(None)` if it does not exist.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file to `path`, creating parent dirs as
/// needed. Sets file permissions to 0600 on Unix.
pub fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct LectioConfig {
    pub db_config: DbConfig,
    pub model: String,
    pub llm_base_url: Option<String>,
    /// Environment variable the API key is read from when a run starts.
    pub api_key_env: String,
    pub reference_base_url: String,
    pub pipeline: PipelineConfig,
}

impl LectioConfig {
    /// Resolve configuration from the user's config file.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config_from(&config_path())?;
        Ok(Self::resolve_with(cli_db_url, file_config.as_ref()))
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `LECTIO_DATABASE_URL` > `[database] url` > `DbConfig::DEFAULT_URL`
    /// - Model: `LECTIO_MODEL` > `[llm] model` > `anthropic::DEFAULT_MODEL`
    /// - Reference service: `LECTIO_REFERENCE_URL` > `[references] base_url` > `lookup::DEFAULT_BASE_URL`
    pub fn resolve_with(cli_db_url: Option<&str>, file_config: Option<&ConfigFile>) -> Self {
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::ENV_VAR) {
            url
        } else if let Some(cfg) = file_config.filter(|c| !c.database.url.is_empty()) {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let llm = file_config.map(|c| &c.llm);
        let model = std::env::var(MODEL_ENV_VAR)
            .ok()
            .or_else(|| llm.and_then(|l| l.model.clone()))
            .unwrap_or_else(|| anthropic::DEFAULT_MODEL.to_string());
        let api_key_env = llm
            .and_then(|l| l.api_key_env.clone())
            .unwrap_or_else(|| anthropic::DEFAULT_API_KEY_ENV.to_string());

        let reference_base_url = std::env::var(REFERENCE_URL_ENV_VAR)
            .ok()
            .or_else(|| file_config.and_then(|c| c.references.base_url.clone()))
            .unwrap_or_else(|| lookup::DEFAULT_BASE_URL.to_string());

        let pipeline = match file_config {
            Some(cfg) => cfg.pipeline.apply(PipelineConfig::default()),
            None => PipelineConfig::default(),
        };

        Self {
            db_config: DbConfig::new(db_url),
            model,
            llm_base_url: llm.and_then(|l| l.base_url.clone()),
            api_key_env,
            reference_base_url,
            pipeline,
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
