//! 功能元件模組
//!
//! 每個子模組實現一個獨立的功能，包含主要邏輯和專用工具

pub mod frame_sampler;
pub mod image_tiler;
pub mod metadata_recorder;
pub mod pipeline;

pub use frame_sampler::VideoFrameSampler;
pub use image_tiler::ImageTiler;
pub use metadata_recorder::MetadataRecorder;
pub use pipeline::PipelineOrchestrator;
