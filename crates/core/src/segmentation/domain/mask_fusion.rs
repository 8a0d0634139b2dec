use crate::segmentation::domain::raw_mask::RawMask;
use crate::shared::mask::Mask;

/// Union of all instance masks at frame resolution (pixelwise maximum).
///
/// Masks at a different resolution are resampled bilinearly first. Returns
/// `None` when there are no instances, i.e. no person in the frame.
pub fn fuse(raw: &[RawMask], width: u32, height: u32) -> Option<Mask> {
    let mut iter = raw.iter();
    let first = iter.next()?;
    let mut fused = first.mask.resized(width, height);
    for instance in iter {
        if instance.mask.width() == width && instance.mask.height() == height {
            fused.max_assign(&instance.mask);
        } else {
            fused.max_assign(&instance.mask.resized(width, height));
        }
    }
    Some(fused.clamped())
}
