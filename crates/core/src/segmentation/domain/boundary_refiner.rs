use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::segmentation::domain::morphology::{
    convex_hull, odd, row_extremes, BinaryImage, StructuringElement,
};
use crate::segmentation::domain::seeded_refiner::{SeededRefiner, Trimap};
use crate::shared::frame::Frame;
use crate::shared::gaussian::blur_plane;
use crate::shared::mask::Mask;

const BALANCED_BLUR_SIZE: usize = 3;
const AGGRESSIVE_BLUR_SIZE: usize = 7;
const CLOSE_KERNEL_RATIO: f64 = 0.03;
const MIN_CLOSE_KERNEL: usize = 9;
/// Components smaller than this fraction of the frame get no hull.
const HULL_MIN_AREA_RATIO: f64 = 0.001;
/// Fraction of the mask's vertical extent, from the bottom, that is widened.
const LOWER_BAND_RATIO: f64 = 0.4;
const LOWER_BAND_KERNEL_RATIO: f64 = 0.02;
const MIN_LOWER_BAND_KERNEL: usize = 5;
const MIN_SEED_KERNEL: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefinementPolicy {
    Minimal,
    #[default]
    Balanced,
    Aggressive,
}

impl RefinementPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefinementPolicy::Minimal => "minimal",
            RefinementPolicy::Balanced => "balanced",
            RefinementPolicy::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for RefinementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefinementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(RefinementPolicy::Minimal),
            "balanced" => Ok(RefinementPolicy::Balanced),
            "aggressive" => Ok(RefinementPolicy::Aggressive),
            other => Err(format!(
                "Boundary refinement must be one of: minimal, balanced, aggressive, got '{other}'"
            )),
        }
    }
}

/// Applies a boundary policy to a fused mask.
///
/// Minimal trusts the detector as-is. Balanced only softens edges and leaves
/// the rest to temporal smoothing; it deliberately does no hull or hole
/// work, since hull-based cleanup produced polygonal silhouettes. Aggressive
/// closes gaps, fills holes, bridges occluded limbs with convex hulls,
/// widens the lower body and finishes with an edge-aware pass.
pub struct BoundaryRefiner {
    seeded: Box<dyn SeededRefiner>,
}

impl BoundaryRefiner {
    pub fn new(seeded: Box<dyn SeededRefiner>) -> Self {
        Self { seeded }
    }

    pub fn refine(&self, frame: &Frame, fused: &Mask, policy: RefinementPolicy) -> Mask {
        match policy {
            RefinementPolicy::Minimal => fused.clone(),
            RefinementPolicy::Balanced => soften(fused.clone(), BALANCED_BLUR_SIZE),
            RefinementPolicy::Aggressive => {
                soften(self.aggressive(frame, fused).to_mask(), AGGRESSIVE_BLUR_SIZE)
            }
        }
    }

    fn aggressive(&self, frame: &Frame, fused: &Mask) -> BinaryImage {
        let (w, h) = (fused.width() as usize, fused.height() as usize);
        let min_dim = w.min(h);

        let binary = BinaryImage::from_mask(fused, 0.5);
        let close_size = odd((min_dim as f64 * CLOSE_KERNEL_RATIO).round() as usize)
            .max(MIN_CLOSE_KERNEL);
        let mut shaped = binary
            .close(&StructuringElement::ellipse(close_size))
            .fill_holes();

        bridge_with_hulls(&mut shaped, (w * h) as f64 * HULL_MIN_AREA_RATIO);
        extend_lower_band(&mut shaped);

        let seed_size = odd(close_size / 2).max(MIN_SEED_KERNEL);
        let element = StructuringElement::ellipse(seed_size);
        let trimap = Trimap::from_bands(&shaped.erode(&element), &shaped.dilate(&element), &shaped);
        match self.seeded.refine(frame, &trimap) {
            Ok(refined) => refined,
            Err(e) => {
                log::debug!("Edge-aware refinement skipped on frame {}: {e}", frame.index());
                shaped
            }
        }
    }
}

fn soften(mask: Mask, kernel_size: usize) -> Mask {
    let (w, h) = (mask.width(), mask.height());
    let mut data = mask.into_vec();
    blur_plane(&mut data, w as usize, h as usize, kernel_size);
    for v in &mut data {
        *v = v.clamp(0.0, 1.0);
    }
    Mask::from_vec(w, h, data)
}

fn bridge_with_hulls(mask: &mut BinaryImage, min_area: f64) {
    let hulls: Vec<_> = mask
        .components()
        .iter()
        .filter(|pixels| pixels.len() as f64 >= min_area)
        .map(|pixels| convex_hull(&row_extremes(pixels)))
        .collect();
    for hull in &hulls {
        mask.fill_convex_polygon(hull);
    }
}

/// Widens the bottom part of the silhouette horizontally, where hands and
/// forearms tend to merge with furniture.
fn extend_lower_band(mask: &mut BinaryImage) {
    let Some((top, bottom)) = mask.row_extent() else {
        return;
    };
    let extent = bottom - top + 1;
    let band_top = bottom + 1 - ((extent as f64 * LOWER_BAND_RATIO).round() as usize).max(1);

    let kernel_w = odd((mask.width() as f64 * LOWER_BAND_KERNEL_RATIO).round() as usize)
        .max(MIN_LOWER_BAND_KERNEL);
    let kernel_h = odd(kernel_w / 3);
    let widened = mask.dilate(&StructuringElement::rect(kernel_w, kernel_h));

    for y in band_top..=bottom {
        for x in 0..mask.width() {
            if widened.get(x, y) {
                mask.set(x, y, true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::domain::seeded_refiner::{RefinementError, Seed};
    use rstest::rstest;

    struct PassThroughRefiner;

    impl SeededRefiner for PassThroughRefiner {
        fn refine(&self, _frame: &Frame, trimap: &Trimap) -> Result<BinaryImage, RefinementError> {
            let mut out = BinaryImage::new(trimap.width, trimap.height);
            for (i, seed) in trimap.seeds.iter().enumerate() {
                out.set(i % trimap.width, i / trimap.width, seed.is_foreground());
            }
            Ok(out)
        }
    }

    struct FailingRefiner;

    impl SeededRefiner for FailingRefiner {
        fn refine(&self, _frame: &Frame, _trimap: &Trimap) -> Result<BinaryImage, RefinementError> {
            Err(RefinementError::InsufficientSeeds)
        }
    }

    struct ClearingRefiner;

    impl SeededRefiner for ClearingRefiner {
        fn refine(&self, _frame: &Frame, trimap: &Trimap) -> Result<BinaryImage, RefinementError> {
            let mut out = BinaryImage::new(trimap.width, trimap.height);
            for (i, seed) in trimap.seeds.iter().enumerate() {
                out.set(i % trimap.width, i / trimap.width, *seed == Seed::Foreground);
            }
            Ok(out)
        }
    }

    fn frame(w: u32, h: u32) -> Frame {
        Frame::from_fn(w, h, 0, |x, y| [(x * 3) as u8, (y * 5) as u8, 90])
    }

    fn ring_mask(w: u32, h: u32) -> Mask {
        // Thick square ring with a hole in the middle.
        Mask::from_fn(w, h, |x, y| {
            let outer = (20..60).contains(&x) && (10..70).contains(&y);
            let inner = (30..50).contains(&x) && (25..55).contains(&y);
            if outer && !inner {
                0.95
            } else {
                0.02
            }
        })
    }

    fn noisy_mask(w: u32, h: u32) -> Mask {
        Mask::from_fn(w, h, |x, y| ((x * 37 + y * 91) % 101) as f32 / 100.0)
    }

    #[rstest]
    #[case(ring_mask(80, 80))]
    #[case(noisy_mask(40, 30))]
    #[case(Mask::zeros(16, 16))]
    #[case(Mask::filled(16, 16, 1.0))]
    fn test_minimal_is_identity(#[case] mask: Mask) {
        let refiner = BoundaryRefiner::new(Box::new(PassThroughRefiner));
        let f = frame(mask.width(), mask.height());
        assert_eq!(refiner.refine(&f, &mask, RefinementPolicy::Minimal), mask);
    }

    #[rstest]
    fn test_output_stays_in_unit_range(
        #[values(RefinementPolicy::Minimal, RefinementPolicy::Balanced, RefinementPolicy::Aggressive)]
        policy: RefinementPolicy,
        #[values(0, 1, 2)] which: usize,
    ) {
        let mask = match which {
            0 => ring_mask(80, 80),
            1 => noisy_mask(40, 30),
            _ => Mask::filled(12, 12, 1.0),
        };
        let refiner = BoundaryRefiner::new(Box::new(PassThroughRefiner));
        let out = refiner.refine(&frame(mask.width(), mask.height()), &mask, policy);
        assert!(out.data().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_balanced_softens_edges_only() {
        let mask = Mask::from_fn(20, 20, |x, _| if x < 10 { 1.0 } else { 0.0 });
        let refiner = BoundaryRefiner::new(Box::new(PassThroughRefiner));
        let out = refiner.refine(&frame(20, 20), &mask, RefinementPolicy::Balanced);
        assert!(out.get(2, 5) > 0.999);
        assert!(out.get(15, 5) < 1e-6);
        assert!(out.get(9, 5) < 1.0 && out.get(9, 5) > 0.5);
        assert!(out.get(10, 5) > 0.0 && out.get(10, 5) < 0.5);
    }

    #[test]
    fn test_balanced_does_not_fill_holes() {
        let mask = ring_mask(80, 80);
        let refiner = BoundaryRefiner::new(Box::new(PassThroughRefiner));
        let out = refiner.refine(&frame(80, 80), &mask, RefinementPolicy::Balanced);
        assert!(out.get(40, 40) < 0.1);
    }

    #[test]
    fn test_aggressive_fills_enclosed_hole() {
        let mask = ring_mask(80, 80);
        let refiner = BoundaryRefiner::new(Box::new(PassThroughRefiner));
        let out = refiner.refine(&frame(80, 80), &mask, RefinementPolicy::Aggressive);
        assert!(out.get(40, 40) > 0.99);
        assert!(out.get(2, 2) < 0.01);
    }

    #[test]
    fn test_aggressive_falls_back_when_edge_pass_fails() {
        let mask = ring_mask(80, 80);
        let ok = BoundaryRefiner::new(Box::new(PassThroughRefiner))
            .refine(&frame(80, 80), &mask, RefinementPolicy::Aggressive);
        let failed = BoundaryRefiner::new(Box::new(FailingRefiner))
            .refine(&frame(80, 80), &mask, RefinementPolicy::Aggressive);
        assert_eq!(ok, failed);
    }

    #[test]
    fn test_aggressive_uses_edge_pass_result() {
        let mask = ring_mask(80, 80);
        let kept = BoundaryRefiner::new(Box::new(PassThroughRefiner))
            .refine(&frame(80, 80), &mask, RefinementPolicy::Aggressive);
        let eroded = BoundaryRefiner::new(Box::new(ClearingRefiner))
            .refine(&frame(80, 80), &mask, RefinementPolicy::Aggressive);
        let sum = |m: &Mask| m.data().iter().sum::<f32>();
        assert!(sum(&eroded) < sum(&kept));
    }

    #[test]
    fn test_aggressive_bridges_gap_between_arm_and_torso() {
        // Torso column plus a forearm bar joined at one corner; the hull
        // fills the elbow gap between them.
        let mask = Mask::from_fn(100, 100, |x, y| {
            let torso = (10..20).contains(&x) && (10..90).contains(&y);
            let arm = (10..90).contains(&x) && (80..90).contains(&y);
            if torso || arm {
                1.0
            } else {
                0.0
            }
        });
        let refiner = BoundaryRefiner::new(Box::new(PassThroughRefiner));
        let out = refiner.refine(&frame(100, 100), &mask, RefinementPolicy::Aggressive);
        assert!(out.get(30, 70) > 0.99);
        assert!(out.get(80, 20) < 0.01);
    }

    #[test]
    fn test_aggressive_widens_lower_band_only() {
        let mask = Mask::from_fn(200, 100, |x, y| {
            if (90..110).contains(&x) && (10..90).contains(&y) {
                1.0
            } else {
                0.0
            }
        });
        let refiner = BoundaryRefiner::new(Box::new(PassThroughRefiner));
        let out = refiner.refine(&frame(200, 100), &mask, RefinementPolicy::Aggressive);
        // kernel width is 5, so the lower rows gain two columns on each side
        assert!(out.get(88, 80) > 0.5);
        assert!(out.get(87, 20) < 0.5);
    }

    #[rstest]
    #[case("minimal", RefinementPolicy::Minimal)]
    #[case("balanced", RefinementPolicy::Balanced)]
    #[case("aggressive", RefinementPolicy::Aggressive)]
    fn test_policy_parse_and_display(#[case] text: &str, #[case] policy: RefinementPolicy) {
        assert_eq!(text.parse::<RefinementPolicy>().unwrap(), policy);
        assert_eq!(policy.to_string(), text);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!("smooth".parse::<RefinementPolicy>().is_err());
        assert_eq!(RefinementPolicy::default(), RefinementPolicy::Balanced);
    }
}
