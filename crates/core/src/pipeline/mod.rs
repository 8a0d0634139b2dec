pub mod filter_previews_use_case;
pub mod infrastructure;
pub mod pipeline_executor;
pub mod pipeline_logger;
pub mod preview_pipeline;
pub mod process_video_use_case;
pub mod processing_stats;
pub mod selective_filter_pipeline;
