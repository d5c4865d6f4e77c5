use anyhow::{Context, Result, bail};
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const API_URL_ENV: &str = "NOTIFDESK_API_URL";
const API_TOKEN_ENV: &str = "NOTIFDESK_API_TOKEN";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub poll_interval_ms: u64,
    pub auto_mark_as_read: bool,
    pub enable_sound: bool,
    pub enable_native_notifications: bool,
    pub max_toasts: usize,
    pub auto_hide: bool,
    pub hide_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub sound_file: Option<PathBuf>,
    pub error_reporting: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            api_token: None,
            poll_interval_ms: 30_000,
            auto_mark_as_read: false,
            enable_sound: true,
            enable_native_notifications: true,
            max_toasts: 3,
            auto_hide: true,
            hide_delay_ms: 5_000,
            request_timeout_ms: 10_000,
            sound_file: None,
            error_reporting: true,
            log_file: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub path: PathBuf,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub poll_interval: Duration,
    pub auto_mark_as_read: bool,
    pub enable_sound: bool,
    pub enable_native_notifications: bool,
    pub max_toasts: usize,
    pub auto_hide: bool,
    pub hide_delay: Duration,
    pub request_timeout: Duration,
    pub sound_file: Option<PathBuf>,
    pub error_reporting: bool,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        let mut cfg = Self::load_from(&path)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            cfg.api_base_url = url;
        }
        if let Ok(token) = std::env::var(API_TOKEN_ENV) {
            cfg.api_token = Some(token).filter(|t| !t.is_empty());
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads `path`, writing a default file first if there is none.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let default = ConfigFile::default();
            let toml = toml::to_string_pretty(&default)?;
            if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
            fs::write(path, toml)?;
        }
        let content = fs::read_to_string(path).with_context(|| format!("Reading {:?}", path))?;
        let file: ConfigFile = toml::from_str(&content).with_context(|| "Parsing config TOML")?;
        Ok(Self {
            path: path.to_path_buf(),
            api_base_url: file.api_base_url,
            api_token: file.api_token,
            poll_interval: Duration::from_millis(file.poll_interval_ms),
            auto_mark_as_read: file.auto_mark_as_read,
            enable_sound: file.enable_sound,
            enable_native_notifications: file.enable_native_notifications,
            max_toasts: file.max_toasts,
            auto_hide: file.auto_hide,
            hide_delay: Duration::from_millis(file.hide_delay_ms),
            request_timeout: Duration::from_millis(file.request_timeout_ms),
            sound_file: file.sound_file,
            error_reporting: file.error_reporting,
            log_file: file.log_file,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() { bail!("poll_interval_ms must be greater than zero"); }
        if self.max_toasts == 0 { bail!("max_toasts must be at least 1"); }
        let url = Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid api_base_url {:?}", self.api_base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("api_base_url must be http or https, got {}", url.scheme());
        }
        Ok(())
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.log_file {
            Some(p) => Ok(p.clone()),
            None => default_log_path(),
        }
    }
}

fn config_path() -> Result<PathBuf> {
    let base = config_dir().context("Could not determine config directory")?;
    Ok(base.join("notifdesk").join("config.toml"))
}

fn default_log_path() -> Result<PathBuf> {
    let base = data_dir().context("Could not determine data directory")?;
    Ok(base.join("notifdesk").join("notifdesk.log"))
}
