use crate::filtering::domain::compositor::{self, ApplyTo, NoPersonBehavior};
use crate::filtering::domain::frame_filter::FrameFilter;
use crate::segmentation::domain::mask_fusion;
use crate::segmentation::domain::raw_mask::RawMask;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

const PREVIEW_MASK_THRESHOLD: f32 = 0.5;

/// Single-shot rendering for progress previews and filter thumbnails.
///
/// Holds no per-video state: the fused mask is binarised and composited
/// over the whole frame, with no refinement, smoothing or layout tracking.
pub struct PreviewPipeline {
    filter: Box<dyn FrameFilter>,
    apply_to: ApplyTo,
    no_person_behavior: NoPersonBehavior,
}

impl PreviewPipeline {
    pub fn new(
        filter: Box<dyn FrameFilter>,
        apply_to: ApplyTo,
        no_person_behavior: NoPersonBehavior,
    ) -> Self {
        Self {
            filter,
            apply_to,
            no_person_behavior,
        }
    }

    pub fn render(&self, frame: &Frame, raw_masks: &[RawMask]) -> Frame {
        let (w, h) = (frame.width(), frame.height());
        match mask_fusion::fuse(raw_masks, w, h) {
            None => compositor::no_person_output(frame, self.filter.as_ref(), self.no_person_behavior),
            Some(fused) => {
                let person = fused.binarized(PREVIEW_MASK_THRESHOLD);
                let filtered = self.filter.filtered(frame);
                compositor::composite(
                    frame,
                    &filtered,
                    &person,
                    &Mask::filled(w, h, 1.0),
                    self.apply_to,
                )
            }
        }
    }
}
