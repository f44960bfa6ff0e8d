// src/config/mod.rs
pub mod pipeline;

pub use pipeline::{
    is_truthy_flag, load_pipeline_config, resolve_config_path, PipelineConfig, PipelineFileConfig,
    RuntimeSection,
};
