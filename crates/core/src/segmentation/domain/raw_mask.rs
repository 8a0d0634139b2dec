use crate::shared::mask::Mask;

/// One detector output: a per-instance foreground map at any resolution up
/// to the frame's, plus the detection confidence.
#[derive(Clone, Debug, PartialEq)]
pub struct RawMask {
    pub mask: Mask,
    pub score: f32,
}

impl RawMask {
    pub fn new(mask: Mask, score: f32) -> Self {
        Self { mask, score }
    }
}
