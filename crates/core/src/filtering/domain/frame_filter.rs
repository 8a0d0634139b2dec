use crate::shared::frame::Frame;

/// Domain interface for a whole-frame visual effect.
///
/// Implementations modify the frame in-place (`&mut Frame`); compositing
/// decides afterwards which pixels of the result are used.
pub trait FrameFilter: Send {
    fn apply(&self, frame: &mut Frame);

    /// Filtered copy of `frame`, leaving the original untouched.
    fn filtered(&self, frame: &Frame) -> Frame {
        let mut out = frame.clone();
        self.apply(&mut out);
        out
    }
}
