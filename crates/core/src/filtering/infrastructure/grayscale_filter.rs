use crate::filtering::domain::frame_filter::FrameFilter;
use crate::shared::frame::{Frame, LUMA_WEIGHTS};

/// BT.601 luma written back to all three channels.
pub struct GrayscaleFilter;

impl FrameFilter for GrayscaleFilter {
    fn apply(&self, frame: &mut Frame) {
        for px in frame.data_mut().chunks_exact_mut(Frame::CHANNELS) {
            let luma = px[0] as f32 * LUMA_WEIGHTS[0]
                + px[1] as f32 * LUMA_WEIGHTS[1]
                + px[2] as f32 * LUMA_WEIGHTS[2];
            let v = luma.round().clamp(0.0, 255.0) as u8;
            px.fill(v);
        }
    }
}
