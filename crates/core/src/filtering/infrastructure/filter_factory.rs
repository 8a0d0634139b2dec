use crate::filtering::domain::filter_type::FilterType;
use crate::filtering::domain::frame_filter::FrameFilter;

use super::gaussian_blur_filter::GaussianBlurFilter;
use super::grayscale_filter::GrayscaleFilter;
use super::sepia_filter::SepiaFilter;

/// Creates the CPU implementation for a filter type.
pub fn create_filter(filter_type: FilterType) -> Box<dyn FrameFilter> {
    log::debug!("Using {filter_type} filter");
    match filter_type {
        FilterType::Grayscale => Box::new(GrayscaleFilter),
        FilterType::Blur => Box::new(GaussianBlurFilter::default()),
        FilterType::Sepia => Box::new(SepiaFilter),
    }
}
