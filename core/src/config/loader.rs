use crate::config::error::{ConfigError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion backend selection and model defaults
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Search-augmented research API
    #[serde(default)]
    pub research: ResearchConfig,

    /// Vision API used for handwritten math evaluation
    #[serde(default)]
    pub vision: VisionConfig,

    /// Chat relay limits
    #[serde(default)]
    pub chat: ChatConfig,

    /// SQLite location and pool sizing
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Provider credentials, passed explicitly into the adapters
    #[serde(default)]
    pub credentials: Credentials,
}

/// Which completion backend serves generation and chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionBackendKind {
    /// Local `claude` command-line tool, prompt piped via stdin.
    #[default]
    Cli,
    /// Hosted messages API.
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub backend: CompletionBackendKind,

    #[serde(default)]
    pub models: ModelDefaults,

    /// Max tokens for streaming calls; non-streaming calls are capped lower.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout for non-streaming calls, in seconds
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,

    /// Path to the claude binary
    #[serde(default = "default_cli_binary")]
    pub cli_binary: String,

    /// Base URL of the hosted messages API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

/// Model used when a request does not name one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefaults {
    /// Content generation (lessons, quizzes, outlines)
    #[serde(default = "default_content_model")]
    pub content: String,

    /// Chat, hints and journal feedback
    #[serde(default = "default_chat_model")]
    pub chat: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default = "default_research_base_url")]
    pub base_url: String,

    #[serde(default = "default_research_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_base_url")]
    pub base_url: String,

    #[serde(default = "default_vision_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Daily message limit given to newly created kid profiles
    #[serde(default = "default_daily_chat_limit")]
    pub default_daily_limit: u32,

    /// Longest wait for the next streamed fragment before giving up
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Provider credentials.
///
/// Populated once at load time; adapters receive this struct instead of
/// inspecting the process environment.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_oauth_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perplexity_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
}

impl Credentials {
    /// Fill unset fields from the conventional provider variables.
    ///
    /// `lookup` is `std::env::var` in production; empty values count as unset.
    pub fn fill_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if self.anthropic_api_key.is_none() {
            self.anthropic_api_key = read("ANTHROPIC_API_KEY");
        }
        if self.claude_oauth_token.is_none() {
            self.claude_oauth_token = read("CLAUDE_CODE_OAUTH_TOKEN");
        }
        if self.perplexity_api_key.is_none() {
            self.perplexity_api_key = read("PERPLEXITY_API_KEY");
        }
        if self.openai_api_key.is_none() {
            self.openai_api_key = read("OPENAI_API_KEY");
        }
    }
}

// Secrets never reach logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("Credentials")
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .field("claude_oauth_token", &mask(&self.claude_oauth_token))
            .field("perplexity_api_key", &mask(&self.perplexity_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .finish()
    }
}

// Default value functions
fn default_max_tokens() -> u32 {
    16_000
}

fn default_completion_timeout_secs() -> u64 {
    300
}

fn default_cli_binary() -> String {
    "claude".to_string()
}

fn default_api_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_content_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_chat_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_research_base_url() -> String {
    "https://api.perplexity.ai".to_string()
}

fn default_research_model() -> String {
    "sonar".to_string()
}

fn default_vision_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_daily_chat_limit() -> u32 {
    50
}

fn default_stream_idle_timeout_secs() -> u64 {
    120
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("mindcraft").join("mindcraft.db"))
        .unwrap_or_else(|| PathBuf::from("mindcraft.db"))
}

fn default_pool_size() -> u32 {
    8
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            backend: CompletionBackendKind::default(),
            models: ModelDefaults::default(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout_secs(),
            cli_binary: default_cli_binary(),
            api_base_url: default_api_base_url(),
        }
    }
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            content: default_content_model(),
            chat: default_chat_model(),
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_research_base_url(),
            model: default_research_model(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_vision_base_url(),
            model: default_vision_model(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: default_daily_chat_limit(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            pool_size: default_pool_size(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Configuration loader with layered merging
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new ConfigLoader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (MINDCRAFT_ prefix)
    /// 4. Fill unset credentials from the conventional provider variables
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = Config::builder();

        // Layer 1: Defaults (serialize defaults to JSON and load as base)
        let defaults_json = serde_json::to_string(&AppConfig::default())?;
        builder = builder.add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Layer 2: Config file (if provided)
        if let Some(ref path) = self.config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_ref()));
            } else {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
        }

        // Layer 3: Environment variables, double underscore for nesting.
        // Example: MINDCRAFT_COMPLETION__BACKEND=api
        builder = builder.add_source(
            Environment::with_prefix("MINDCRAFT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut app_config: AppConfig = builder.build()?.try_deserialize()?;
        app_config
            .credentials
            .fill_from(|name| std::env::var(name).ok());

        validate(&app_config)?;
        Ok(app_config)
    }

    /// Locate the default config file in standard locations:
    /// 1. Current directory: ./mindcraft.toml
    /// 2. XDG config: ~/.config/mindcraft/config.toml
    /// 3. Home directory: ~/.mindcraft.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./mindcraft.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("mindcraft").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".mindcraft.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<AppConfig> {
        let loader = if let Some(config_path) = Self::find_config_file() {
            ConfigLoader::new().with_file(config_path)
        } else {
            ConfigLoader::new()
        };

        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.database.pool_size == 0 {
        return Err(ConfigError::ValidationError(
            "database.pool_size must be at least 1".to_string(),
        ));
    }
    if config.completion.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "completion.timeout_secs must be at least 1".to_string(),
        ));
    }
    if config.completion.max_tokens == 0 {
        return Err(ConfigError::ValidationError(
            "completion.max_tokens must be at least 1".to_string(),
        ));
    }
    Ok(())
}
