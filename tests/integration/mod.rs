pub mod fallback_pipeline;
