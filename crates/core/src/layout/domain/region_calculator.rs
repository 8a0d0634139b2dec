use crate::layout::domain::layout_tracker::{classify_side, LayoutTracker, LockedSide};
use crate::shared::bbox::BoundingBox;
use crate::shared::mask::Mask;

/// Left column lock covers `[0, 0.55 * width)`.
const LEFT_COLUMN_END: f64 = 0.55;
/// Right column lock covers `[0.45 * width, width)`.
const RIGHT_COLUMN_START: f64 = 0.45;
/// Centred regions are padded by at least this fraction on each side.
const MIN_CENTERED_EXPANSION: f64 = 0.5;
const PERSON_THRESHOLD: f32 = 0.5;

pub const DEFAULT_ROI_EXPANSION: f64 = 0.3;

/// Where filtering may apply in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveRegion {
    pub side: LockedSide,
    pub bbox: BoundingBox,
    pub mask: Mask,
}

/// Turns the tracker's layout decision into a per-pixel active region.
pub struct RegionCalculator {
    roi_expansion: f64,
}

impl RegionCalculator {
    pub fn new(roi_expansion: f64) -> Self {
        Self { roi_expansion }
    }

    pub fn full_frame(width: u32, height: u32) -> ActiveRegion {
        ActiveRegion {
            side: LockedSide::Full,
            bbox: BoundingBox::full(width, height),
            mask: Mask::filled(width, height, 1.0),
        }
    }

    /// Updates `tracker` with this frame's observation and returns the region.
    /// A mask with no confident pixel leaves the tracker alone and yields the
    /// full frame.
    pub fn compute(
        &self,
        fused: &Mask,
        frame_width: u32,
        frame_height: u32,
        tracker: &mut LayoutTracker,
    ) -> ActiveRegion {
        let Some(person) = fused.bounding_box(PERSON_THRESHOLD) else {
            return Self::full_frame(frame_width, frame_height);
        };

        let frame_area = (frame_width as f64 * frame_height as f64).max(1.0);
        let area_ratio = person.area() as f64 / frame_area;
        let width_ratio = person.width() as f64 / frame_width.max(1) as f64;
        let side = tracker.update(classify_side(&person, frame_width), area_ratio, width_ratio);

        let w = frame_width as f64;
        let bbox = match side {
            LockedSide::Full => return Self::full_frame(frame_width, frame_height),
            LockedSide::Left => {
                BoundingBox::new(0, 0, (LEFT_COLUMN_END * w).round() as i32, frame_height as i32)
            }
            LockedSide::Right => BoundingBox::new(
                (RIGHT_COLUMN_START * w).round() as i32,
                0,
                frame_width as i32,
                frame_height as i32,
            ),
            LockedSide::None => {
                let expanded = person
                    .expand(self.roi_expansion.max(MIN_CENTERED_EXPANSION))
                    .clamp(frame_width, frame_height);
                tracker.smooth_bbox(expanded, frame_width, frame_height)
            }
        }
        .clamp(frame_width, frame_height);

        ActiveRegion {
            side,
            bbox,
            mask: Mask::from_rect(frame_width, frame_height, bbox),
        }
    }
}

impl Default for RegionCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_ROI_EXPANSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::domain::layout_tracker::ProposedSide;

    fn blob(w: u32, h: u32, rect: BoundingBox) -> Mask {
        Mask::from_rect(w, h, rect)
    }

    #[test]
    fn test_empty_mask_is_full_frame_without_touching_tracker() {
        let mut tracker = LayoutTracker::default();
        let region = RegionCalculator::default().compute(&Mask::zeros(40, 20), 40, 20, &mut tracker);
        assert_eq!(region.side, LockedSide::Full);
        assert!(region.mask.data().iter().all(|&v| v == 1.0));
        assert_eq!(tracker.state().pending_count, 0);
    }

    #[test]
    fn test_large_person_is_full_frame() {
        let mut tracker = LayoutTracker::default();
        let fused = blob(100, 100, BoundingBox::new(10, 10, 90, 90));
        let region = RegionCalculator::default().compute(&fused, 100, 100, &mut tracker);
        assert_eq!(region.side, LockedSide::Full);
        assert!(region.mask.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_centered_person_gets_expanded_box() {
        let mut tracker = LayoutTracker::default();
        let fused = blob(100, 100, BoundingBox::new(45, 40, 55, 60));
        let region = RegionCalculator::new(0.3).compute(&fused, 100, 100, &mut tracker);
        assert_eq!(region.side, LockedSide::None);
        // expansion floors at 0.5: pad 5px in x, 10px in y
        assert_eq!(region.bbox, BoundingBox::new(40, 30, 60, 70));
        assert_eq!(region.mask.get(39, 50), 0.0);
        assert_eq!(region.mask.get(40, 50), 1.0);
        assert_eq!(region.mask.get(59, 69), 1.0);
        assert_eq!(region.mask.get(60, 50), 0.0);
    }

    #[test]
    fn test_left_lock_covers_left_column() {
        let mut tracker = LayoutTracker::default();
        let fused = blob(100, 50, BoundingBox::new(5, 10, 25, 40));
        let calc = RegionCalculator::default();
        let mut region = calc.compute(&fused, 100, 50, &mut tracker);
        for _ in 0..7 {
            region = calc.compute(&fused, 100, 50, &mut tracker);
        }
        assert_eq!(region.side, LockedSide::Left);
        assert_eq!(region.bbox, BoundingBox::new(0, 0, 55, 50));
        assert_eq!(region.mask.get(54, 49), 1.0);
        assert_eq!(region.mask.get(55, 0), 0.0);
    }

    #[test]
    fn test_right_lock_covers_right_column() {
        let mut tracker = LayoutTracker::default();
        for _ in 0..8 {
            tracker.update(ProposedSide::Right, 0.1, 0.2);
        }
        let fused = blob(100, 50, BoundingBox::new(75, 10, 95, 40));
        let region = RegionCalculator::default().compute(&fused, 100, 50, &mut tracker);
        assert_eq!(region.side, LockedSide::Right);
        assert_eq!(region.bbox, BoundingBox::new(45, 0, 100, 50));
        assert_eq!(region.mask.get(44, 0), 0.0);
        assert_eq!(region.mask.get(45, 0), 1.0);
    }
}
