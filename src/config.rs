use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const CONFIG_FILE: &str = "whatsapp_web_config.json";
const APP_DIR: &str = "whatsapp_web_client_rs";
const SERVER_URL_ENV: &str = "WA_WEB_SERVER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the web interface serving `/api/...`.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Wait after a successful send before re-fetching the thread.
    #[serde(default = "default_reconcile_delay_ms")]
    pub reconcile_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub settings: Settings,

    #[serde(skip)]
    pub config_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_true")]
    pub show_timestamps: bool,

    #[serde(default = "default_true")]
    pub show_borders: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_timestamps: true,
            show_borders: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            page_size: default_page_size(),
            poll_interval_secs: default_poll_interval_secs(),
            reconcile_delay_ms: default_reconcile_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            settings: Settings::default(),
            config_dir: PathBuf::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_server_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_reconcile_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_dir = Self::get_config_dir();
        let config_path = config_dir.join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let mut config = Self::from_json(&content)?;
            config.config_dir = config_dir;
            config
        } else {
            Self::create_new(config_dir)?
        };

        config.apply_server_override(std::env::var(SERVER_URL_ENV).ok());
        Ok(config)
    }

    fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.config_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(&self)?;
        fs::write(config_path, content)?;
        Ok(())
    }

    fn create_new(config_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&config_dir)?;

        let config = Config {
            config_dir,
            ..Config::default()
        };
        config.save()?;

        println!("Created default config at {:?}", config.config_dir.join(CONFIG_FILE));
        println!("Using server {} (set {} to override)", config.server_url, SERVER_URL_ENV);
        Ok(config)
    }

    /// Environment wins over the file. Blank values are ignored.
    fn apply_server_override(&mut self, value: Option<String>) {
        if let Some(url) = value {
            let url = url.trim();
            if !url.is_empty() {
                self.server_url = url.to_string();
            }
        }
    }

    fn get_config_dir() -> PathBuf {
        // First check current directory
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        if current_dir.join(CONFIG_FILE).exists() {
            return current_dir;
        }

        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir).join(APP_DIR)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".config").join(APP_DIR)
        } else {
            PathBuf::from(format!(".{}", APP_DIR))
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.config_dir.join("debug.log")
    }
}
