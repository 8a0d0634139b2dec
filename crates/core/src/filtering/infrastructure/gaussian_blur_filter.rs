use std::cell::RefCell;

use crate::filtering::domain::frame_filter::FrameFilter;
use crate::shared::constants::BLUR_KERNEL_SIZE;
use crate::shared::frame::Frame;
use crate::shared::gaussian;

/// Whole-frame separable Gaussian blur.
pub struct GaussianBlurFilter {
    kernel: Vec<f32>,
    blur_temp: RefCell<Vec<f32>>,
}

impl GaussianBlurFilter {
    /// `kernel_size` is forced odd.
    pub fn new(kernel_size: usize) -> Self {
        Self {
            kernel: gaussian::gaussian_kernel_1d(kernel_size | 1),
            blur_temp: RefCell::new(Vec::new()),
        }
    }
}

impl Default for GaussianBlurFilter {
    fn default() -> Self {
        Self::new(BLUR_KERNEL_SIZE)
    }
}

impl FrameFilter for GaussianBlurFilter {
    fn apply(&self, frame: &mut Frame) {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        let mut temp = self.blur_temp.borrow_mut();
        gaussian::separable_gaussian_blur_with_kernel(
            frame.data_mut(),
            w,
            h,
            Frame::CHANNELS,
            &self.kernel,
            &mut temp,
        );
    }
}
