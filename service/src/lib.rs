//! HTTP front end for the Mindcraft content pipelines and chat relay.

use std::sync::Arc;

use axum::Router;
use mindcraft_core::chat::ChatRelay;
use mindcraft_core::completion::{CompletionBackend, build_backend};
use mindcraft_core::config::AppConfig;
use mindcraft_core::db::Store;
use mindcraft_core::evaluate::{VisionConfig, VisionEvaluator};
use mindcraft_core::generate::Generator;
use mindcraft_core::pipeline::{CurriculumPipeline, ResearchPipeline};
use mindcraft_core::research::{PerplexityClient, PerplexityConfig, ResearchBackend};

pub mod error;
mod routes;

pub use error::{ApiError, ApiResult};

/// Shared handles cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub generator: Generator,
    pub research: ResearchPipeline,
    pub curriculum: CurriculumPipeline,
    pub relay: ChatRelay,
    pub evaluator: Arc<VisionEvaluator>,
    pub default_daily_limit: u32,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        store: Store,
        completion: Arc<dyn CompletionBackend>,
        research: Arc<dyn ResearchBackend>,
    ) -> Self {
        let generator = Generator::new(completion.clone(), config.completion.models.clone());
        Self {
            research: ResearchPipeline::new(store.clone(), research, generator.clone()),
            curriculum: CurriculumPipeline::new(store.clone(), generator.clone()),
            relay: ChatRelay::from_app_config(store.clone(), completion, config),
            evaluator: Arc::new(VisionEvaluator::new(VisionConfig::from_app_config(config))),
            default_daily_limit: config.chat.default_daily_limit,
            generator,
            store,
        }
    }

    /// Open the database and build the configured backends.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store = Store::open(&config.database.path, config.database.pool_size)?;
        let completion = build_backend(config)?;
        let research = Arc::new(PerplexityClient::new(PerplexityConfig::from_app_config(
            config,
        )));
        Ok(Self::new(config, store, completion, research))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::content::routes())
        .merge(routes::research::routes())
        .merge(routes::curriculum::routes())
        .merge(routes::chat::routes())
        .merge(routes::math::routes())
        .with_state(state)
}
