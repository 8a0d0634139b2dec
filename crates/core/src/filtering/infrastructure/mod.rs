pub mod filter_factory;
pub mod gaussian_blur_filter;
pub mod grayscale_filter;
pub mod sepia_filter;
