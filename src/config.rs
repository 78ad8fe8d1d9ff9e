//! Bot configuration
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. Optional TOML file (`imgbot.toml` unless overridden)
//! 3. `IMGBOT_*` environment variables
//! 4. The raw `BOT_TOKEN` / `HUGGINGFACE_TOKEN` secrets

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "imgbot.toml";

/// Default image generation endpoint
pub const DEFAULT_API_URL: &str =
    "https://api-inference.huggingface.co/models/stabilityai/stable-diffusion-3.5-large";

/// Default Telegram Bot API base URL
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("{0} is required (set it in the environment or .env)")]
    MissingSecret(&'static str),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram bot token
    pub bot_token: String,
    /// Bearer token for the generation API
    pub huggingface_token: String,
    /// Image generation model endpoint
    pub api_url: String,
    /// Telegram Bot API base URL
    pub telegram_api_url: String,
    /// SQLite database path (None = in-memory)
    pub db_path: Option<String>,
    /// Append-only error log file
    pub error_log: String,
    /// Per-request timeout for image generation
    pub request_timeout_secs: u64,
    /// Delay between "typing" signals while a batch runs
    pub typing_interval_secs: u64,
    /// Long-poll timeout for getUpdates
    pub poll_timeout_secs: u64,
    /// Idle period after which a chat worker is retired
    pub worker_idle_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            huggingface_token: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            db_path: Some("users.db".to_string()),
            error_log: "bot_errors.log".to_string(),
            request_timeout_secs: 60,
            typing_interval_secs: 3,
            poll_timeout_secs: 30,
            worker_idle_secs: 600,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::figment(file).extract().map_err(ConfigError::from)
    }

    /// Build the provider stack without extracting
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("IMGBOT_"))
            .merge(Env::raw().only(&["BOT_TOKEN", "HUGGINGFACE_TOKEN"]))
    }

    /// Ensure both secrets are present and the timers can fire
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::MissingSecret("BOT_TOKEN"));
        }
        if self.huggingface_token.trim().is_empty() {
            return Err(ConfigError::MissingSecret("HUGGINGFACE_TOKEN"));
        }
        // A zero typing interval spins the indicator; a zero timeout fails every request
        if self.typing_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("typing_interval_secs"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("request_timeout_secs"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn typing_interval(&self) -> Duration {
        Duration::from_secs(self.typing_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_secs(self.worker_idle_secs)
    }
}
