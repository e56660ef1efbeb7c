use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const APP_DIR: &str = "xfree-coupons";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Local wall-clock time of the daily send, `HH:MM`.
    #[serde(default = "default_time_to_send")]
    pub time_to_send: String,

    /// Whole-request timeout for page fetches. Unset leaves the transport default.
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,

    /// Marketplace names looked up in index pages. Each entry is a regex.
    #[serde(default = "default_markets")]
    pub markets: Vec<String>,

    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    pub links: LinkConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// One listing page to scrape. The `kind` tag picks the extraction shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Index page of `<article id=…>` posts linking to detail pages.
    Index { url: String },
    /// Single page with a coupon table: date, code, description.
    Table { url: String, market: String },
}

impl SourceConfig {
    pub fn url(&self) -> &str {
        match self {
            SourceConfig::Index { url } | SourceConfig::Table { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Host replacements applied to coupon links, `from -> to`.
    #[serde(default = "default_host_rewrites")]
    pub host_rewrites: Vec<(String, String)>,

    /// Query parameters removed from coupon links.
    #[serde(default = "default_tracking_params")]
    pub tracking_params: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: Option<String>,

    /// Long-poll timeout for `getUpdates`.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u32,

    /// Secret expected by `/stat`.
    pub access_token: Option<String>,

    /// Optional cap on `/print N`.
    #[serde(default)]
    pub max_print: Option<u32>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("coupons.db").to_string_lossy().to_string()
}

fn default_time_to_send() -> String {
    "19:00".to_string()
}

fn default_markets() -> Vec<String> {
    vec!["ЛитРес".to_string()]
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig::Table {
        url: "https://lovikod.ru/knigi/promokody-litres".to_string(),
        market: "ЛитРес".to_string(),
    }]
}

fn default_host_rewrites() -> Vec<(String, String)> {
    vec![("li.lovikod.ru".to_string(), "www.litres.ru".to_string())]
}

fn default_tracking_params() -> Vec<String> {
    vec!["lfrom".to_string()]
}

fn default_update_interval() -> u32 {
    60
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host_rewrites: default_host_rewrites(),
            tracking_params: default_tracking_params(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            update_interval_secs: default_update_interval(),
            access_token: None,
            max_print: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            time_to_send: default_time_to_send(),
            http_timeout_secs: None,
            markets: default_markets(),
            sources: default_sources(),
            links: LinkConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl Config {
    /// Reads the config file (defaults when it does not exist), applies
    /// environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!(path = %config_path.display(), "config file not found, using defaults");
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = var("XFREE_DB_PATH") {
            self.db_path = path;
        }
        if let Some(time) = var("XFREE_TIME_TO_SEND") {
            self.time_to_send = time;
        }
        if let Some(token) = var("XFREE_TELEGRAM_TOKEN") {
            self.telegram.token = Some(token);
        }
        if let Some(interval) = var("XFREE_TELEGRAM_UPDATE_INTERVAL") {
            self.telegram.update_interval_secs = interval.parse().map_err(|_| {
                AppError::Config(format!(
                    "XFREE_TELEGRAM_UPDATE_INTERVAL must be a number of seconds, got {interval:?}"
                ))
            })?;
        }
        if let Some(token) = var("XFREE_STAT_TOKEN") {
            self.telegram.access_token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram_token().is_none() {
            return Err(AppError::Config("telegram token is required".to_string()));
        }
        if self.db_path.trim().is_empty() {
            return Err(AppError::Config("db_path is empty".to_string()));
        }
        self.send_time()?;
        if self.sources.is_empty() {
            return Err(AppError::Config("no sources configured".to_string()));
        }
        for source in &self.sources {
            url::Url::parse(source.url())?;
        }
        Ok(())
    }

    pub fn telegram_token(&self) -> Option<&str> {
        self.telegram
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn send_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.time_to_send.trim(), "%H:%M").map_err(|_| {
            AppError::Config(format!(
                "time_to_send must look like HH:MM, got {:?}",
                self.time_to_send
            ))
        })
    }
}
