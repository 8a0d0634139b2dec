use crate::filtering::domain::compositor::{self, ApplyTo, NoPersonBehavior};
use crate::filtering::domain::frame_filter::FrameFilter;
use crate::layout::domain::layout_tracker::{LayoutTracker, LockedSide};
use crate::layout::domain::region_calculator::RegionCalculator;
use crate::segmentation::domain::boundary_refiner::{BoundaryRefiner, RefinementPolicy};
use crate::segmentation::domain::interactive_refiner::InteractiveRefiner;
use crate::segmentation::domain::mask_fusion;
use crate::segmentation::domain::raw_mask::RawMask;
use crate::segmentation::domain::temporal_smoother::TemporalSmoother;
use crate::shared::constants::REFINER_HINT_SIZE;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

const HINT_THRESHOLD: f32 = 0.5;

/// Per-run knobs of the primary pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineSettings {
    pub apply_to: ApplyTo,
    pub no_person_behavior: NoPersonBehavior,
    pub region_aware: bool,
    pub roi_expansion: f64,
    pub refinement: RefinementPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            apply_to: ApplyTo::Background,
            no_person_behavior: NoPersonBehavior::KeepOriginal,
            region_aware: true,
            roi_expansion: 0.3,
            refinement: RefinementPolicy::Balanced,
        }
    }
}

/// Result of pushing one frame through the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOutcome {
    pub frame: Frame,
    /// Number of person instances the detector reported.
    pub persons: usize,
    /// Active-region mode used for compositing; `None` without a person.
    pub side: Option<LockedSide>,
}

impl FrameOutcome {
    pub fn has_person(&self) -> bool {
        self.persons > 0
    }
}

/// The stateful per-frame pipeline for one video.
///
/// fuse → refine → temporal smoothing → active region → composite.
/// Temporal and layout state live here and are never shared between runs,
/// so build a fresh instance per video.
pub struct SelectiveFilterPipeline {
    filter: Box<dyn FrameFilter>,
    settings: PipelineSettings,
    boundary: BoundaryRefiner,
    interactive: Option<Box<dyn InteractiveRefiner>>,
    smoother: TemporalSmoother,
    tracker: LayoutTracker,
    regions: RegionCalculator,
}

impl SelectiveFilterPipeline {
    pub fn new(
        filter: Box<dyn FrameFilter>,
        settings: PipelineSettings,
        boundary: BoundaryRefiner,
        smoother: TemporalSmoother,
        interactive: Option<Box<dyn InteractiveRefiner>>,
    ) -> Self {
        Self {
            filter,
            settings,
            boundary,
            interactive,
            smoother,
            tracker: LayoutTracker::default(),
            regions: RegionCalculator::new(settings.roi_expansion),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &LayoutTracker {
        &self.tracker
    }

    pub fn process(&mut self, frame: &Frame, raw_masks: &[RawMask]) -> FrameOutcome {
        let (w, h) = (frame.width(), frame.height());

        let Some(fused) = mask_fusion::fuse(raw_masks, w, h) else {
            self.smoother.register_no_detection();
            self.tracker.register_no_person();
            return FrameOutcome {
                frame: compositor::no_person_output(
                    frame,
                    self.filter.as_ref(),
                    self.settings.no_person_behavior,
                ),
                persons: 0,
                side: None,
            };
        };

        let refined = self.refine(frame, &fused);
        let temporal = self.smoother.smooth(&refined, frame);
        let region = if self.settings.region_aware {
            self.regions.compute(&fused, w, h, &mut self.tracker)
        } else {
            RegionCalculator::full_frame(w, h)
        };

        let filtered = self.filter.filtered(frame);
        let output = compositor::composite(
            frame,
            &filtered,
            &temporal,
            &region.mask,
            self.settings.apply_to,
        );

        FrameOutcome {
            frame: output,
            persons: raw_masks.len(),
            side: Some(region.side),
        }
    }

    /// The interactive refiner, when present, replaces the boundary policy.
    fn refine(&mut self, frame: &Frame, fused: &Mask) -> Mask {
        let Some(refiner) = self.interactive.as_mut() else {
            return self.boundary.refine(frame, fused, self.settings.refinement);
        };

        let Some(bbox) = fused.bounding_box(HINT_THRESHOLD) else {
            return fused.clone();
        };
        let hint = fused.resized(REFINER_HINT_SIZE, REFINER_HINT_SIZE);

        match refiner.refine(frame, bbox, &hint) {
            Ok((mask, score)) if mask.same_size(fused) => {
                log::debug!("Frame {}: interactive refinement score {score:.3}", frame.index());
                mask.clamped()
            }
            Ok((mask, _)) => {
                log::warn!(
                    "Interactive refiner returned {}x{} mask for {}x{} frame, using fused mask",
                    mask.width(),
                    mask.height(),
                    fused.width(),
                    fused.height()
                );
                fused.clone()
            }
            Err(e) => {
                log::debug!("Frame {}: interactive refinement failed: {e}", frame.index());
                fused.clone()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::filtering::infrastructure::grayscale_filter::GrayscaleFilter;
    use crate::segmentation::domain::flow_estimator::{FlowEstimator, FlowField, LumaPlane};
    use crate::segmentation::domain::morphology::BinaryImage;
    use crate::segmentation::domain::seeded_refiner::{RefinementError, SeededRefiner, Trimap};
    use crate::segmentation::domain::temporal_smoother::TemporalConfig;
    use crate::shared::bbox::BoundingBox;

    pub(crate) struct ZeroFlow;

    impl FlowEstimator for ZeroFlow {
        fn estimate(
            &mut self,
            previous: &LumaPlane,
            _current: &LumaPlane,
        ) -> Result<FlowField, Box<dyn std::error::Error>> {
            Ok(FlowField::zeros(previous.width, previous.height))
        }
    }

    pub(crate) struct NoSeeds;

    impl SeededRefiner for NoSeeds {
        fn refine(&self, _frame: &Frame, _trimap: &Trimap) -> Result<BinaryImage, RefinementError> {
            Err(RefinementError::InsufficientSeeds)
        }
    }

    /// Pipeline with deterministic collaborators: zero flow and a seeded
    /// refiner that always declines.
    pub(crate) fn test_pipeline(
        settings: PipelineSettings,
        interactive: Option<Box<dyn InteractiveRefiner>>,
    ) -> SelectiveFilterPipeline {
        SelectiveFilterPipeline::new(
            Box::new(GrayscaleFilter),
            settings,
            BoundaryRefiner::new(Box::new(NoSeeds)),
            TemporalSmoother::new(TemporalConfig::default(), Box::new(ZeroFlow)),
            interactive,
        )
    }

    fn minimal() -> PipelineSettings {
        PipelineSettings {
            region_aware: false,
            refinement: RefinementPolicy::Minimal,
            ..PipelineSettings::default()
        }
    }

    fn colourful(index: usize) -> Frame {
        Frame::from_fn(8, 6, index, |x, y| [(x * 30) as u8, (y * 40) as u8, 200])
    }

    fn person_left_half() -> RawMask {
        RawMask::new(
            Mask::from_rect(8, 6, BoundingBox::new(0, 0, 4, 6)),
            0.9,
        )
    }

    fn is_gray(p: [u8; 3]) -> bool {
        p[0] == p[1] && p[1] == p[2]
    }

    struct FailingRefiner;

    impl InteractiveRefiner for FailingRefiner {
        fn refine(
            &mut self,
            _frame: &Frame,
            _bbox: BoundingBox,
            _hint: &Mask,
        ) -> Result<(Mask, f32), Box<dyn std::error::Error>> {
            Err("model crashed".into())
        }
    }

    /// Reports everything as foreground.
    struct EverythingRefiner;

    impl InteractiveRefiner for EverythingRefiner {
        fn refine(
            &mut self,
            frame: &Frame,
            _bbox: BoundingBox,
            hint: &Mask,
        ) -> Result<(Mask, f32), Box<dyn std::error::Error>> {
            assert_eq!((hint.width(), hint.height()), (REFINER_HINT_SIZE, REFINER_HINT_SIZE));
            Ok((Mask::filled(frame.width(), frame.height(), 1.0), 0.95))
        }
    }

    #[test]
    fn test_person_kept_background_filtered() {
        let mut pipeline = test_pipeline(minimal(), None);
        let frame = colourful(0);
        let out = pipeline.process(&frame, &[person_left_half()]);

        assert!(out.has_person());
        assert_eq!(out.side, Some(LockedSide::Full));
        assert_eq!(out.frame.pixel(1, 2), frame.pixel(1, 2));
        assert!(is_gray(out.frame.pixel(6, 2)));
    }

    #[test]
    fn test_no_person_keeps_original_by_default() {
        let mut pipeline = test_pipeline(minimal(), None);
        let frame = colourful(3);
        let out = pipeline.process(&frame, &[]);
        assert!(!out.has_person());
        assert_eq!(out.side, None);
        assert_eq!(out.frame, frame);
    }

    #[test]
    fn test_no_person_can_filter_whole_frame() {
        let settings = PipelineSettings {
            no_person_behavior: NoPersonBehavior::ApplyFilter,
            ..minimal()
        };
        let mut pipeline = test_pipeline(settings, None);
        let out = pipeline.process(&colourful(0), &[]);
        assert!(out.frame.data().chunks(3).all(|p| is_gray([p[0], p[1], p[2]])));
    }

    #[test]
    fn test_failing_interactive_refiner_falls_back_to_fused_mask() {
        let mut pipeline = test_pipeline(minimal(), Some(Box::new(FailingRefiner)));
        let frame = colourful(0);
        let out = pipeline.process(&frame, &[person_left_half()]);
        assert_eq!(out.frame.pixel(1, 2), frame.pixel(1, 2));
        assert!(is_gray(out.frame.pixel(6, 2)));
    }

    #[test]
    fn test_interactive_refiner_supersedes_boundary_policy() {
        let mut pipeline = test_pipeline(minimal(), Some(Box::new(EverythingRefiner)));
        let frame = colourful(0);
        let out = pipeline.process(&frame, &[person_left_half()]);
        // whole frame counts as person, so nothing is filtered
        assert_eq!(out.frame, frame);
    }

    #[test]
    fn test_region_aware_updates_layout_state() {
        let settings = PipelineSettings {
            region_aware: true,
            ..minimal()
        };
        let mut pipeline = test_pipeline(settings, None);
        let frame = Frame::from_fn(100, 50, 0, |_, _| [10, 120, 250]);
        let person = RawMask::new(Mask::from_rect(100, 50, BoundingBox::new(5, 10, 25, 40)), 0.8);

        let first = pipeline.process(&frame, &[person.clone()]);
        assert_eq!(first.side, Some(LockedSide::None));
        for _ in 0..7 {
            pipeline.process(&frame, &[person.clone()]);
        }
        assert_eq!(pipeline.tracker().state().locked_side, LockedSide::Left);

        let locked = pipeline.process(&frame, &[person]);
        assert_eq!(locked.side, Some(LockedSide::Left));
        // outside the left column nothing is filtered
        assert_eq!(locked.frame.pixel(90, 5), frame.pixel(90, 5));
        assert!(is_gray(locked.frame.pixel(40, 5)));
    }
}
