mod curriculum_pipeline;
mod relay;
mod research_pipeline;
mod support;
