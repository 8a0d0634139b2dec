use crate::segmentation::domain::raw_mask::RawMask;
use crate::shared::frame::Frame;

/// Domain interface for person instance segmentation.
///
/// Returns one `RawMask` per detected person with a score at or above
/// `confidence`. Implementations must not keep cross-call state that callers
/// depend on; `&mut self` only allows reusing inference buffers.
pub trait PersonSegmenter: Send {
    fn segment(
        &mut self,
        frame: &Frame,
        confidence: f32,
    ) -> Result<Vec<RawMask>, Box<dyn std::error::Error>>;
}
