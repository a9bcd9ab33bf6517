use std::path::Path;

use tracing::{debug, info};
use turnstone_common::{Error, Result};

use crate::model::AppConfig;

/// Loads configuration from a TOML file with environment overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from `path`, or defaults when the file is absent.
    ///
    /// A `.env` file next to the process is honored before environment
    /// overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) if path.exists() => {
                info!("loading config from {}", path.display());
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
                toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?
            }
            Some(path) => {
                debug!("config file {} not found, using defaults", path.display());
                AppConfig::default()
            }
            None => AppConfig::default(),
        };

        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(provider) = std::env::var("TURNSTONE_DEFAULT_PROVIDER") {
            config.llm.default_provider = provider;
        }
        if let Ok(model) = std::env::var("TURNSTONE_DEFAULT_MODEL") {
            config.llm.default_model = model;
        }
        if let Ok(retries) = std::env::var("TURNSTONE_MAX_CALL_RETRIES")
            && let Ok(parsed) = retries.parse()
        {
            config.llm.max_call_retries = parsed;
        }
        if let Ok(timeout) = std::env::var("TURNSTONE_TURN_TIMEOUT_SECS")
            && let Ok(parsed) = timeout.parse()
        {
            config.turn.timeout_secs = parsed;
        }
        if let Ok(path) = std::env::var("TURNSTONE_DB_PATH") {
            config.database.path = path;
        }
    }
}
