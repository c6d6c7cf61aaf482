/// Configuration for the content pipelines, completion backends and service.
///
/// Layered configuration, lowest priority first:
/// 1. Defaults (from code)
/// 2. Config file (`mindcraft.toml`)
/// 3. Environment variables (`MINDCRAFT_*` prefix, `__` for nesting)
///
/// Provider credentials additionally fall back to their conventional
/// variables (`ANTHROPIC_API_KEY`, `CLAUDE_CODE_OAUTH_TOKEN`,
/// `PERPLEXITY_API_KEY`, `OPENAI_API_KEY`) when the layers leave them unset.
/// Adapters never read the process environment themselves.
///
/// # Example
///
/// ```no_run
/// use mindcraft_core::config::ConfigLoader;
///
/// let config = ConfigLoader::load_default()?;
/// # Ok::<(), mindcraft_core::config::ConfigError>(())
/// ```
pub mod error;
pub mod loader;

pub use error::{ConfigError, Result};
pub use loader::{
    AppConfig, ChatConfig, CompletionBackendKind, CompletionConfig, ConfigLoader, Credentials,
    DatabaseConfig, ModelDefaults, ResearchConfig, ServerConfig, VisionConfig,
};
