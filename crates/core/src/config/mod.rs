use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_REQUEST: &str =
    "生成一部一万字左右的现代都市言情短篇小说，要有完整的故事情节，包含爱情、成长、励志元素";
pub const DEFAULT_FALLBACK_TITLE: &str = "AI生成小说";

pub const ENV_API_KEY: &str = "DEEPSEEK_API_KEY";
pub const ENV_BASE_URL: &str = "DEEPSEEK_BASE_URL";
pub const ENV_MODEL: &str = "DEEPSEEK_MODEL";

fn default_base_url() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model_name() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    180
}

fn default_max_attempts() -> usize {
    5
}

fn default_retry_delay() -> u64 {
    5
}

fn default_total_chapters() -> u32 {
    3
}

fn default_word_budget() -> u32 {
    16_000
}

fn default_outline_word_target() -> u32 {
    10_000
}

fn default_outline_max_tokens() -> u32 {
    2_000
}

fn default_title_max_tokens() -> u32 {
    100
}

fn default_fallback_title() -> String {
    DEFAULT_FALLBACK_TITLE.to_string()
}

fn default_request() -> String {
    DEFAULT_REQUEST.to_string()
}

fn default_system_prompt_path() -> PathBuf {
    PathBuf::from("prompt.txt")
}

fn default_reference_path() -> PathBuf {
    PathBuf::from("example.txt")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("API key is missing; set DEEPSEEK_API_KEY in the environment or .env file")]
    MissingApiKey,
    #[error("invalid configuration value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Backoff base in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model_name: default_model_name(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
        }
    }
}

impl ApiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NovelConfig {
    #[serde(default = "default_total_chapters")]
    pub total_chapters: u32,
    #[serde(default = "default_word_budget")]
    pub word_budget: u32,
    #[serde(default = "default_outline_word_target")]
    pub outline_word_target: u32,
    #[serde(default = "default_outline_max_tokens")]
    pub outline_max_tokens: u32,
    #[serde(default = "default_title_max_tokens")]
    pub title_max_tokens: u32,
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,
    #[serde(default = "default_request")]
    pub default_request: String,
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: PathBuf,
    #[serde(default = "default_reference_path")]
    pub reference_path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for NovelConfig {
    fn default() -> Self {
        Self {
            total_chapters: default_total_chapters(),
            word_budget: default_word_budget(),
            outline_word_target: default_outline_word_target(),
            outline_max_tokens: default_outline_max_tokens(),
            title_max_tokens: default_title_max_tokens(),
            fallback_title: default_fallback_title(),
            default_request: default_request(),
            system_prompt_path: default_system_prompt_path(),
            reference_path: default_reference_path(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptConfig {
    #[serde(default)]
    pub custom_directories: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub novel: NovelConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Reads `path` when it exists and falls back to defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    /// Overlays credentials and endpoint from the environment. Blank values
    /// are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_blank(ENV_API_KEY) {
            self.api.api_key = key.trim().to_string();
        }
        if let Some(url) = non_blank(ENV_BASE_URL) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(model) = non_blank(ENV_MODEL) {
            self.api.model_name = model.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.api.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "api.model_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.api.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "api.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.novel.total_chapters == 0 {
            return Err(ConfigError::Invalid {
                field: "novel.total_chapters",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.novel.word_budget < self.novel.total_chapters {
            return Err(ConfigError::Invalid {
                field: "novel.word_budget",
                reason: format!(
                    "{} words cannot cover {} chapters",
                    self.novel.word_budget, self.novel.total_chapters
                ),
            });
        }
        Ok(())
    }
}
