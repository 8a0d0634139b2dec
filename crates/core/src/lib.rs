pub mod filtering;
pub mod jobs;
pub mod layout;
pub mod pipeline;
pub mod segmentation;
pub mod shared;
pub mod video;
