use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

const CONFIG_DIR_PREFIX: &str = "news-sheets";

/// Default name of the spreadsheet file in Google Drive.
pub const DEFAULT_SPREADSHEET_NAME: &str = "Financial News Scraper Data";

pub const ENV_CLIENT_ID: &str = "GOOGLE_OAUTH_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GOOGLE_OAUTH_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "GOOGLE_OAUTH_REDIRECT_URI";
pub const ENV_TOKEN_FILE: &str = "GOOGLE_TOKEN_FILE";
pub const ENV_SPREADSHEET_ID: &str = "FINANCIAL_NEWS_SPREADSHEET_ID";

const DEFAULT_REDIRECT_URI: &str = "http://localhost";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub google: GoogleConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl GoogleConfig {
    /// Resolve client credentials: environment variables take precedence,
    /// then the TOML config file.
    pub fn resolve() -> Result<Self> {
        if let (Ok(client_id), Ok(client_secret)) =
            (env::var(ENV_CLIENT_ID), env::var(ENV_CLIENT_SECRET))
            && !client_id.is_empty()
            && !client_secret.is_empty()
        {
            return Ok(Self {
                client_id,
                client_secret,
            });
        }

        let config_path = Config::config_file()?;
        if config_path.exists() {
            let config = Config::load()?;
            if !config.google.client_id.is_empty() && !config.google.client_secret.is_empty() {
                return Ok(config.google);
            }
        }

        Err(AppError::Config(format!(
            "Google OAuth client credentials not found. Set {} and {}, \
             or add a [google] section to {:?}",
            ENV_CLIENT_ID, ENV_CLIENT_SECRET, config_path
        )))
    }

    pub fn redirect_uri() -> String {
        env::var(ENV_REDIRECT_URI).unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file()?;

        if !config_path.exists() {
            return Err(AppError::Config(format!(
                "Config file not found at {:?}. Please create one.",
                config_path
            )));
        }

        let contents = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    fn xdg_dirs() -> xdg::BaseDirectories {
        xdg::BaseDirectories::with_prefix(CONFIG_DIR_PREFIX)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        let xdg_dirs = Self::xdg_dirs();
        xdg_dirs
            .place_config_file("config.toml")
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))
    }

    /// Get a config file path alongside config.toml
    pub fn place_config_file(filename: &str) -> Result<PathBuf> {
        let xdg_dirs = Self::xdg_dirs();
        xdg_dirs
            .place_config_file(filename)
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))
    }

    /// Get the cache directory path
    pub fn cache_dir() -> Result<PathBuf> {
        let xdg = Self::xdg_dirs();
        xdg.get_cache_home()
            .ok_or_else(|| AppError::Config("Failed to determine cache directory".to_string()))
    }

    /// Get a cache file path
    pub fn cache_file(filename: &str) -> Result<PathBuf> {
        let xdg = Self::xdg_dirs();
        xdg.place_cache_file(filename)
            .map_err(|e| AppError::Config(format!("Failed to create cache file path: {}", e)))
    }
}

/// Persisted spreadsheet id, so later runs skip the Drive search.
///
/// Lookup order: environment override, then the id written earlier in the
/// same run, then the JSON config file. A missing or corrupt file is
/// absence, not an error.
pub struct SheetConfig {
    path: PathBuf,
    // Same-run reuse after set(), without mutating the process environment.
    cached: Mutex<Option<String>>,
}

impl SheetConfig {
    pub fn open() -> Result<Self> {
        Ok(Self::new(Config::place_config_file("sheets_config.json")?))
    }

    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cached: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<String> {
        if let Ok(id) = env::var(ENV_SPREADSHEET_ID)
            && !id.is_empty()
        {
            return Some(id);
        }

        if let Some(id) = self.cached.lock().unwrap().clone() {
            return Some(id);
        }

        self.read_from_disk()
    }

    fn read_from_disk(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.path).ok()?;
        let config: serde_json::Value = serde_json::from_str(&contents).ok()?;
        config
            .get("spreadsheet_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Merge the spreadsheet id into the config file, preserving unrelated
    /// keys, and record it for same-run reuse.
    pub fn set(&self, spreadsheet_id: &str) -> Result<()> {
        let mut config = match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str::<serde_json::Value>(&contents)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default(),
            Err(_) => serde_json::Map::new(),
        };

        config.insert(
            "spreadsheet_id".to_string(),
            serde_json::Value::String(spreadsheet_id.to_string()),
        );

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to a temp file and rename so a crash mid-write can't leave
        // a truncated config behind.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(&config)?)?;
        fs::rename(&tmp_path, &self.path)?;

        *self.cached.lock().unwrap() = Some(spreadsheet_id.to_string());

        Ok(())
    }
}
