use crate::segmentation::domain::interactive_refiner::InteractiveRefiner;
use crate::segmentation::domain::morphology::BinaryImage;
use crate::segmentation::domain::seeded_refiner::{Seed, SeededRefiner, Trimap};
use crate::shared::bbox::BoundingBox;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

/// Box-prompted refinement on top of a seeded refiner.
///
/// Everything outside the prompt box is fixed background; inside it the
/// upsampled hint provides the probable labels. The quality score is the
/// IoU between the result and the hint, so a refinement that wanders far
/// from the detector's opinion reports low confidence.
pub struct BoxPromptRefiner {
    seeded: Box<dyn SeededRefiner>,
}

impl BoxPromptRefiner {
    pub fn new(seeded: Box<dyn SeededRefiner>) -> Self {
        Self { seeded }
    }
}

impl InteractiveRefiner for BoxPromptRefiner {
    fn refine(
        &mut self,
        frame: &Frame,
        bbox: BoundingBox,
        mask_hint: &Mask,
    ) -> Result<(Mask, f32), Box<dyn std::error::Error>> {
        let (fw, fh) = (frame.width(), frame.height());
        let bbox = bbox.clamp(fw, fh);
        let hint = BinaryImage::from_mask(&mask_hint.resized(fw, fh), 0.5);

        let (w, h) = (fw as usize, fh as usize);
        let mut seeds = vec![Seed::Background; w * h];
        for y in bbox.y1 as usize..bbox.y2 as usize {
            for x in bbox.x1 as usize..bbox.x2 as usize {
                seeds[y * w + x] = if hint.get(x, y) {
                    Seed::ProbableForeground
                } else {
                    Seed::ProbableBackground
                };
            }
        }

        let refined = self.seeded.refine(
            frame,
            &Trimap {
                width: w,
                height: h,
                seeds,
            },
        )?;
        let score = iou(&refined, &hint);
        Ok((refined.to_mask(), score))
    }
}

fn iou(a: &BinaryImage, b: &BinaryImage) -> f32 {
    let (mut inter, mut union) = (0usize, 0usize);
    for (&p, &q) in a.data().iter().zip(b.data()) {
        inter += (p && q) as usize;
        union += (p || q) as usize;
    }
    if union == 0 {
        0.0
    } else {
        inter as f32 / union as f32
    }
}
