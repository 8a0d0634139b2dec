use thiserror::Error;

use crate::segmentation::domain::morphology::BinaryImage;
use crate::shared::frame::Frame;

/// Per-pixel label handed to a seeded refiner. `Foreground`/`Background`
/// are fixed; the probable labels are only the initial guess.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seed {
    Background,
    Foreground,
    ProbableBackground,
    ProbableForeground,
}

impl Seed {
    pub fn is_foreground(self) -> bool {
        matches!(self, Seed::Foreground | Seed::ProbableForeground)
    }

    pub fn is_fixed(self) -> bool {
        matches!(self, Seed::Foreground | Seed::Background)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trimap {
    pub width: usize,
    pub height: usize,
    pub seeds: Vec<Seed>,
}

impl Trimap {
    /// Sure foreground where `sure_fg`, sure background outside `maybe_fg`,
    /// and `current` decides the probable label in between.
    pub fn from_bands(sure_fg: &BinaryImage, maybe_fg: &BinaryImage, current: &BinaryImage) -> Self {
        let seeds = sure_fg
            .data()
            .iter()
            .zip(maybe_fg.data())
            .zip(current.data())
            .map(|((&sure, &maybe), &cur)| match (sure, maybe, cur) {
                (true, _, _) => Seed::Foreground,
                (false, false, _) => Seed::Background,
                (false, true, true) => Seed::ProbableForeground,
                (false, true, false) => Seed::ProbableBackground,
            })
            .collect();
        Self {
            width: current.width(),
            height: current.height(),
            seeds,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum RefinementError {
    #[error("trimap is {trimap_width}x{trimap_height} but frame is {frame_width}x{frame_height}")]
    ShapeMismatch {
        trimap_width: usize,
        trimap_height: usize,
        frame_width: usize,
        frame_height: usize,
    },
    #[error("refinement needs both foreground and background samples")]
    InsufficientSeeds,
}

/// Edge-aware foreground/background separation seeded by a trimap.
pub trait SeededRefiner: Send {
    fn refine(&self, frame: &Frame, trimap: &Trimap) -> Result<BinaryImage, RefinementError>;
}
