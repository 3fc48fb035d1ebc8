use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::services::prompt::DEFAULT_SAMPLE_ROWS;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub max_file_size: usize,
    pub openai_key: String,
    pub model: String,
    pub api_base: Option<String>,
    pub analysis_sample_rows: usize,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Failed to load OPENAI_API_KEY: not set"))?;

        let analysis_sample_rows = parse_or(&lookup, "ANALYSIS_SAMPLE_ROWS", DEFAULT_SAMPLE_ROWS)?;
        if analysis_sample_rows == 0 {
            anyhow::bail!("ANALYSIS_SAMPLE_ROWS must be at least 1");
        }

        Ok(Config {
            max_file_size: parse_or(&lookup, "MAX_FILE_SIZE", default_max_file_size())?,
            openai_key,
            model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: lookup("OPENAI_API_BASE"),
            analysis_sample_rows,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from_str(DEFAULT_BIND_ADDR)?)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

pub fn load_config() -> Result<Config> {
    let config = Config::new()?;
    tracing::info!(
        "Configuration loaded: model={}, max_file_size={}B, sample_rows={}",
        config.model,
        config.max_file_size,
        config.analysis_sample_rows
    );
    Ok(config)
}
