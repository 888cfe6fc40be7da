use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_DATA_DIR: &str = ".paperdesk";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: Url,
    pub data_dir: PathBuf,
}

impl Config {
    /// Loads `.env` (seeding it from `.env.example` when missing) and reads the
    /// `PAPERDESK_*` variables.
    pub fn from_env() -> Result<Self> {
        if !Path::new(".env").exists() && Path::new(".env.example").exists() {
            tracing::info!("Creating .env from .env.example");
            std::fs::copy(".env.example", ".env")?;
        }
        dotenvy::dotenv().ok();

        Self::from_values(
            env::var("PAPERDESK_API_BASE_URL").ok(),
            env::var("PAPERDESK_DATA_DIR").ok(),
        )
    }

    pub fn from_values(api_base_url: Option<String>, data_dir: Option<String>) -> Result<Self> {
        let raw_url = api_base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = Url::parse(raw_url.trim())
            .with_context(|| format!("Invalid PAPERDESK_API_BASE_URL: {}", raw_url))?;
        let data_dir = data_dir
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        Ok(Self {
            api_base_url,
            data_dir: PathBuf::from(data_dir),
        })
    }

    pub fn override_with(mut self, api_base_url: Option<&str>, data_dir: Option<&Path>) -> Result<Self> {
        if let Some(url) = api_base_url {
            self.api_base_url = Url::parse(url).with_context(|| format!("Invalid --api-url: {}", url))?;
        }
        if let Some(dir) = data_dir {
            self.data_dir = dir.to_path_buf();
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_values(None, Some("  ".to_string())).unwrap();
        assert_eq!(config.api_base_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(Config::from_values(Some("not a url".to_string()), None).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::from_values(Some("https://api.example.org".to_string()), None)
            .unwrap()
            .override_with(Some("http://127.0.0.1:9000"), Some(Path::new("/tmp/desk")))
            .unwrap();
        assert_eq!(config.api_base_url.port(), Some(9000));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/desk"));
    }
}
