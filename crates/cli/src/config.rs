use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub db_path: Option<PathBuf>,
    pub roots: Option<Vec<PathBuf>>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_path = config_dir.join("sift").join("config.toml");

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading config file at {}", config_path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "parsing config file")?;
        Ok(config)
    }
}
