use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

/// Promptable mask refinement (box + low-resolution mask hint).
///
/// Returns the best frame-resolution mask and its quality score. Callers
/// fall back to their own mask on any error.
pub trait InteractiveRefiner: Send {
    fn refine(
        &mut self,
        frame: &Frame,
        bbox: BoundingBox,
        mask_hint: &Mask,
    ) -> Result<(Mask, f32), Box<dyn std::error::Error>>;
}
