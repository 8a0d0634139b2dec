pub mod bbox;
pub mod constants;
pub mod error;
pub mod frame;
pub mod gaussian;
pub mod mask;
pub mod model_resolver;
pub mod video_metadata;
