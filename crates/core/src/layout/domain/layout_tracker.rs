use serde::Serialize;

use crate::shared::bbox::BoundingBox;

/// Mask bounding boxes centred left of this fraction of the width propose `Left`.
pub const LEFT_SIDE_RATIO: f64 = 0.4;
/// Centred right of this fraction they propose `Right`.
pub const RIGHT_SIDE_RATIO: f64 = 0.6;

/// Where the person appears to be in this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposedSide {
    Left,
    Right,
    Center,
}

/// The tracker's stabilised layout decision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockedSide {
    #[default]
    None,
    Left,
    Right,
    Full,
}

impl LockedSide {
    fn from_proposed(side: ProposedSide) -> Self {
        match side {
            ProposedSide::Left => LockedSide::Left,
            ProposedSide::Right => LockedSide::Right,
            ProposedSide::Center => LockedSide::None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    /// Detections at least this wide (fraction of frame width) count as centred.
    pub wide_release_ratio: f64,
    pub full_frame_threshold: f64,
    pub full_frame_release: f64,
    pub lock_frames: u32,
    pub unlock_frames: u32,
    pub center_release_frames: u32,
    pub decay_frames: u32,
    /// Weight of the newest observation in the bounding-box EMA.
    pub bbox_smoothing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            wide_release_ratio: 0.6,
            full_frame_threshold: 0.55,
            full_frame_release: 0.45,
            lock_frames: 8,
            unlock_frames: 15,
            center_release_frames: 10,
            decay_frames: 45,
            bbox_smoothing: 0.15,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutState {
    pub locked_side: LockedSide,
    pub pending_side: Option<ProposedSide>,
    pub pending_count: u32,
    pub drift_count: u32,
    pub center_count: u32,
    pub no_person_count: u32,
    pub smoothed_bbox: Option<BoundingBox>,
}

impl LayoutState {
    fn clear_counters(&mut self) {
        self.pending_side = None;
        self.pending_count = 0;
        self.drift_count = 0;
        self.center_count = 0;
    }
}

/// Hysteresis state machine deciding which part of the frame is active.
///
/// A column lock needs `lock_frames` agreeing observations to engage and
/// `unlock_frames` consecutive opposite-side observations to flip, so a
/// single misclassified frame never moves the active region. Large subjects
/// switch to `Full` immediately and only release below a lower threshold.
pub struct LayoutTracker {
    config: LayoutConfig,
    state: LayoutState,
}

impl LayoutTracker {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            state: LayoutState::default(),
        }
    }

    pub fn state(&self) -> &LayoutState {
        &self.state
    }

    pub fn update(&mut self, proposed: ProposedSide, area_ratio: f64, width_ratio: f64) -> LockedSide {
        let cfg = self.config;
        let state = &mut self.state;
        state.no_person_count = 0;

        let proposed = if width_ratio >= cfg.wide_release_ratio {
            ProposedSide::Center
        } else {
            proposed
        };

        if area_ratio >= cfg.full_frame_threshold {
            state.locked_side = LockedSide::Full;
            state.clear_counters();
            state.smoothed_bbox = None;
            return LockedSide::Full;
        }

        if state.locked_side == LockedSide::Full {
            if area_ratio >= cfg.full_frame_release {
                return LockedSide::Full;
            }
            log::debug!("Layout: releasing full-frame lock (area {area_ratio:.2})");
            state.locked_side = LockedSide::None;
        }

        match state.locked_side {
            LockedSide::Left | LockedSide::Right => {
                let current = state.locked_side;
                let observed = LockedSide::from_proposed(proposed);
                if observed == current {
                    state.drift_count = 0;
                    state.center_count = 0;
                } else if proposed == ProposedSide::Center {
                    state.drift_count = 0;
                    state.center_count += 1;
                    if state.center_count >= cfg.center_release_frames {
                        log::debug!("Layout: person centred, releasing {current:?} lock");
                        state.locked_side = LockedSide::None;
                        state.clear_counters();
                    }
                } else {
                    state.center_count = 0;
                    state.drift_count += 1;
                    if state.drift_count >= cfg.unlock_frames {
                        log::debug!("Layout: lock moved from {current:?} to {observed:?}");
                        state.locked_side = observed;
                        state.clear_counters();
                    }
                }
            }
            _ => match proposed {
                ProposedSide::Center => {
                    state.pending_side = None;
                    state.pending_count = 0;
                }
                side => {
                    if state.pending_side == Some(side) {
                        state.pending_count += 1;
                    } else {
                        state.pending_side = Some(side);
                        state.pending_count = 1;
                    }
                    if state.pending_count >= cfg.lock_frames {
                        state.locked_side = LockedSide::from_proposed(side);
                        state.clear_counters();
                        log::debug!("Layout: locked to {:?}", state.locked_side);
                    }
                }
            },
        }

        state.locked_side
    }

    /// Counts a frame without a person; a long enough run resets everything.
    pub fn register_no_person(&mut self) {
        self.state.no_person_count += 1;
        if self.state.no_person_count >= self.config.decay_frames {
            self.reset();
        }
    }

    /// Exponentially smooths the centred region across frames.
    pub fn smooth_bbox(&mut self, bbox: BoundingBox, frame_width: u32, frame_height: u32) -> BoundingBox {
        let target = bbox.clamp(frame_width, frame_height);
        let a = self.config.bbox_smoothing;
        let lerp = |prev: i32, next: i32| (prev as f64 + a * (next - prev) as f64).round() as i32;
        let smoothed = match self.state.smoothed_bbox {
            None => target,
            Some(prev) => BoundingBox::new(
                lerp(prev.x1, target.x1),
                lerp(prev.y1, target.y1),
                lerp(prev.x2, target.x2),
                lerp(prev.y2, target.y2),
            )
            .clamp(frame_width, frame_height),
        };
        self.state.smoothed_bbox = Some(smoothed);
        smoothed
    }

    pub fn reset(&mut self) {
        self.state = LayoutState::default();
    }
}

impl Default for LayoutTracker {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

pub fn classify_side(bbox: &BoundingBox, frame_width: u32) -> ProposedSide {
    let cx = bbox.center_x();
    let w = frame_width as f64;
    if cx < LEFT_SIDE_RATIO * w {
        ProposedSide::Left
    } else if cx > RIGHT_SIDE_RATIO * w {
        ProposedSide::Right
    } else {
        ProposedSide::Center
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SMALL: f64 = 0.1;
    const NARROW: f64 = 0.2;

    fn locked(side: ProposedSide) -> LayoutTracker {
        let mut t = LayoutTracker::default();
        for _ in 0..8 {
            t.update(side, SMALL, NARROW);
        }
        assert_eq!(t.state().locked_side, LockedSide::from_proposed(side));
        t
    }

    #[test]
    fn test_locks_on_eighth_matching_frame() {
        let mut t = LayoutTracker::default();
        for _ in 0..7 {
            assert_eq!(t.update(ProposedSide::Left, SMALL, NARROW), LockedSide::None);
        }
        assert_eq!(t.update(ProposedSide::Left, SMALL, NARROW), LockedSide::Left);
        assert_eq!(t.state().pending_count, 0);
    }

    #[test]
    fn test_interrupted_pending_restarts() {
        let mut t = LayoutTracker::default();
        for _ in 0..7 {
            t.update(ProposedSide::Right, SMALL, NARROW);
        }
        t.update(ProposedSide::Left, SMALL, NARROW);
        assert_eq!(t.state().pending_side, Some(ProposedSide::Left));
        assert_eq!(t.state().pending_count, 1);
        t.update(ProposedSide::Center, SMALL, NARROW);
        assert_eq!(t.state().pending_side, None);
    }

    #[test]
    fn test_alternating_sides_keep_lock() {
        let mut t = locked(ProposedSide::Left);
        for i in 0..40 {
            let side = if i % 2 == 0 {
                ProposedSide::Right
            } else {
                ProposedSide::Left
            };
            assert_eq!(t.update(side, SMALL, NARROW), LockedSide::Left);
        }
    }

    #[test]
    fn test_sustained_drift_flips_lock() {
        let mut t = locked(ProposedSide::Left);
        for _ in 0..14 {
            assert_eq!(t.update(ProposedSide::Right, SMALL, NARROW), LockedSide::Left);
        }
        assert_eq!(t.update(ProposedSide::Right, SMALL, NARROW), LockedSide::Right);
        assert_eq!(t.state().drift_count, 0);
    }

    #[test]
    fn test_center_dwell_releases_lock() {
        let mut t = locked(ProposedSide::Right);
        for _ in 0..9 {
            assert_eq!(t.update(ProposedSide::Center, SMALL, NARROW), LockedSide::Right);
        }
        assert_eq!(t.update(ProposedSide::Center, SMALL, NARROW), LockedSide::None);
    }

    #[test]
    fn test_wide_detection_counts_as_center() {
        let mut t = locked(ProposedSide::Left);
        for _ in 0..10 {
            t.update(ProposedSide::Left, SMALL, 0.65);
        }
        assert_eq!(t.state().locked_side, LockedSide::None);
    }

    #[rstest]
    #[case(LockedSide::None)]
    #[case(LockedSide::Left)]
    #[case(LockedSide::Right)]
    fn test_full_frame_takes_priority(#[case] start: LockedSide) {
        let mut t = match start {
            LockedSide::Left => locked(ProposedSide::Left),
            LockedSide::Right => locked(ProposedSide::Right),
            _ => LayoutTracker::default(),
        };
        t.smooth_bbox(BoundingBox::new(0, 0, 10, 10), 100, 100);
        assert_eq!(t.update(ProposedSide::Left, 0.55, NARROW), LockedSide::Full);
        assert_eq!(t.state().smoothed_bbox, None);
        assert_eq!(t.state().drift_count, 0);
    }

    #[test]
    fn test_full_frame_hysteresis() {
        let mut t = LayoutTracker::default();
        t.update(ProposedSide::Center, 0.6, 0.5);
        assert_eq!(t.update(ProposedSide::Center, 0.5, 0.5), LockedSide::Full);
        assert_eq!(t.update(ProposedSide::Center, 0.45, 0.5), LockedSide::Full);
        assert_eq!(t.update(ProposedSide::Center, 0.44, 0.5), LockedSide::None);
    }

    #[test]
    fn test_no_person_decay_resets_state() {
        let mut t = locked(ProposedSide::Left);
        t.smooth_bbox(BoundingBox::new(5, 5, 20, 20), 100, 100);
        for _ in 0..44 {
            t.register_no_person();
        }
        assert_eq!(t.state().locked_side, LockedSide::Left);
        t.register_no_person();
        assert_eq!(*t.state(), LayoutState::default());
    }

    #[test]
    fn test_detection_interrupts_no_person_run() {
        let mut t = locked(ProposedSide::Left);
        for _ in 0..44 {
            t.register_no_person();
        }
        t.update(ProposedSide::Left, SMALL, NARROW);
        t.register_no_person();
        assert_eq!(t.state().locked_side, LockedSide::Left);
        assert_eq!(t.state().no_person_count, 1);
    }

    #[test]
    fn test_smooth_bbox_ema() {
        let mut t = LayoutTracker::default();
        let first = t.smooth_bbox(BoundingBox::new(0, 0, 100, 100), 200, 200);
        assert_eq!(first, BoundingBox::new(0, 0, 100, 100));
        let second = t.smooth_bbox(BoundingBox::new(100, 100, 200, 200), 200, 200);
        assert_eq!(second, BoundingBox::new(15, 15, 115, 115));
    }

    #[test]
    fn test_smooth_bbox_clamps_to_frame() {
        let mut t = LayoutTracker::default();
        let b = t.smooth_bbox(BoundingBox::new(-20, -5, 500, 90), 100, 80);
        assert_eq!(b, BoundingBox::new(0, 0, 100, 80));
        let degenerate = t.smooth_bbox(BoundingBox::new(100, 80, 100, 80), 100, 80);
        assert!(degenerate.width() >= 1 && degenerate.height() >= 1);
    }

    #[rstest]
    #[case(BoundingBox::new(0, 0, 60, 10), ProposedSide::Left)]
    #[case(BoundingBox::new(70, 0, 100, 10), ProposedSide::Right)]
    #[case(BoundingBox::new(30, 0, 70, 10), ProposedSide::Center)]
    #[case(BoundingBox::new(20, 0, 60, 10), ProposedSide::Center)]
    fn test_classify_side(#[case] bbox: BoundingBox, #[case] expected: ProposedSide) {
        assert_eq!(classify_side(&bbox, 100), expected);
    }
}
