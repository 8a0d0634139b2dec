use crate::filtering::domain::frame_filter::FrameFilter;
use crate::shared::frame::Frame;

/// Sepia tone matrix; rows produce R, G, B from (R, G, B).
///
/// Red and blue input weights are swapped relative to the textbook matrix,
/// so saturated blue warms up more than saturated red.
const SEPIA: [[f32; 3]; 3] = [
    [0.189, 0.769, 0.393],
    [0.168, 0.686, 0.349],
    [0.131, 0.534, 0.272],
];

pub struct SepiaFilter;

impl FrameFilter for SepiaFilter {
    fn apply(&self, frame: &mut Frame) {
        for px in frame.data_mut().chunks_exact_mut(Frame::CHANNELS) {
            let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
            for (out, row) in px.iter_mut().zip(SEPIA.iter()) {
                let v = row[0] * r + row[1] * g + row[2] * b;
                *out = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}
