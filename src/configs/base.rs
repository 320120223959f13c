use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{common::ConfigError, configs::*};

const DEFAULT_PATHS: [&str; 2] = ["config.toml", "config.default.toml"];

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub tls: TlsConfig,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub balancer: BalancerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads `path` if given, otherwise the first of `config.toml` and
    /// `config.default.toml` that exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => DEFAULT_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
                .ok_or_else(|| ConfigError::NotFound(DEFAULT_PATHS.join(" or ")))?,
        };

        let config_str = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;

        let config = Self::from_toml(&config_str, &config_path)?;
        crate::log_println!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml(config_str: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_str).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.player.fps.is_finite() && self.player.fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "player.fps must be positive, got {}",
                self.player.fps
            )));
        }
        if self.balancer.port_start > self.balancer.port_end {
            return Err(ConfigError::Invalid(format!(
                "balancer port range {}..={} is empty",
                self.balancer.port_start, self.balancer.port_end
            )));
        }
        for entry in &self.catalog {
            entry.tier_paths().map_err(|e| {
                ConfigError::Invalid(format!("catalog entry {:?}: {}", entry.title, e))
            })?;
        }
        if self.player.idle_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "player.idle_poll_ms must be at least 1".to_string(),
            ));
        }
        if self.balancer.interval_secs == 0 || self.player.tier_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "probe intervals must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}
