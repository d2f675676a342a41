use anyhow::Result;
use serde::Deserialize;
use std::env;

pub const DEFAULT_DB_PATH: &str = "data/marksix.db";
pub const DEFAULT_HISTORY_URL: &str = "https://history.macaumarksix.com/history/macaujc2/y";
pub const DEFAULT_LATEST_URL: &str = "https://macaumarksix.com/api/macaujc2.com";
pub const DEFAULT_LIVE_URL: &str = "https://macaumarksix.com/api/live2";
pub const DEFAULT_JSON_DIR: &str = "json_data";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    /// Base URL; the year is appended as the last path segment.
    pub history_url: String,
    pub latest_url: String,
    pub live_url: String,
    pub json_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        Config {
            database_url: get("MARKSIX_DB_PATH", DEFAULT_DB_PATH),
            history_url: get("MARKSIX_HISTORY_URL", DEFAULT_HISTORY_URL),
            latest_url: get("MARKSIX_LATEST_URL", DEFAULT_LATEST_URL),
            live_url: get("MARKSIX_LIVE_URL", DEFAULT_LIVE_URL),
            json_dir: get("MARKSIX_JSON_DIR", DEFAULT_JSON_DIR),
        }
    }

    pub fn history_url_for(&self, year: &str) -> String {
        format!("{}/{}", self.history_url.trim_end_matches('/'), year)
    }
}

pub fn load() -> Result<Config> {
    Ok(Config::from_lookup(|key| env::var(key).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database_url, DEFAULT_DB_PATH);
        assert_eq!(
            config.history_url_for("2025"),
            "https://history.macaumarksix.com/history/macaujc2/y/2025"
        );
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(|key| match key {
            "MARKSIX_DB_PATH" => Some("/tmp/test.db".to_string()),
            "MARKSIX_HISTORY_URL" => Some("http://localhost:8080/y/".to_string()),
            _ => None,
        });
        assert_eq!(config.database_url, "/tmp/test.db");
        assert_eq!(config.history_url_for("2024"), "http://localhost:8080/y/2024");
        assert_eq!(config.live_url, DEFAULT_LIVE_URL);
    }
}
