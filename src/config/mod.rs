// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod settings;

pub use loader::{load_config, load_config_with_env, parse_str, CONFIG_PATH_ENV};
pub use settings::{
    BackendConfig, BackendKind, BackendSelection, Config, GatewaySettings, ModerationSettings,
    RedactedSettings, ServerConfig, SkillSettings,
};
