// Configuration loader
// Loads settings from a TOML file and applies environment overrides

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Config;

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "SUBJECTCHAT_CONFIG";

/// Load configuration from file (if any) and the process environment
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    load_config_with_env(explicit_path, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an injectable environment lookup
pub fn load_config_with_env<F>(explicit_path: Option<&Path>, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let path = explicit_path
        .map(Path::to_path_buf)
        .or_else(|| env(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()).map(PathBuf::from))
        .or_else(default_config_path);

    let mut config = match path {
        Some(path) if path.exists() => {
            tracing::debug!("Loading configuration from {}", path.display());
            parse_file(&path)?
        }
        Some(path) if explicit_path.is_some() => {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }
        _ => Config::default(),
    };

    apply_env_overrides(&mut config, &env);

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".subjectchat/config.toml"))
}

fn parse_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
    parse_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse TOML text into a [`Config`], filling unspecified fields with defaults
pub fn parse_str(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;
    Ok(config)
}

/// Environment variables win over file values. Names match the web
/// service's historical `.env` keys.
fn apply_env_overrides<F>(config: &mut Config, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("OPENAI_BASE_URL") {
        config.backend.openai_base_url = Some(v);
    }
    if let Some(v) = get("OPENAI_API_KEY") {
        config.backend.openai_api_key = Some(v);
    }
    if let Some(v) = get("OPENAI_MODEL") {
        config.backend.openai_model = v;
    }
    if let Some(v) = get("ANTHROPIC_API_KEY") {
        config.backend.anthropic_api_key = Some(v);
    }
    if let Some(v) = get("ANTHROPIC_MODEL") {
        config.backend.anthropic_model = v;
    }
    if let Some(v) = get("SUBJECTCHAT_BIND") {
        config.server.bind_address = v;
    }
    if let Some(v) = get("SUBJECTCHAT_SKILL_DB") {
        config.skills.db_path = Some(PathBuf::from(v));
    }
    if let Some(v) = get("SUBJECTCHAT_ENV") {
        config.env = v;
    }
    if config.env.is_empty() {
        config.env = super::constants::DEFAULT_ENV.to_string();
    }
}
