use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::filtering::domain::frame_filter::FrameFilter;
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

/// Which side of the person mask receives the filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyTo {
    #[default]
    Background,
    Person,
}

/// What to emit for frames in which no person was detected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoPersonBehavior {
    #[default]
    KeepOriginal,
    ApplyFilter,
}

impl ApplyTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyTo::Background => "background",
            ApplyTo::Person => "person",
        }
    }
}

impl NoPersonBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoPersonBehavior::KeepOriginal => "keep_original",
            NoPersonBehavior::ApplyFilter => "apply_filter",
        }
    }
}

impl fmt::Display for ApplyTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for NoPersonBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplyTo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "background" => Ok(ApplyTo::Background),
            "person" => Ok(ApplyTo::Person),
            other => Err(format!("Apply-to must be 'background' or 'person', got '{other}'")),
        }
    }
}

impl FromStr for NoPersonBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_original" => Ok(NoPersonBehavior::KeepOriginal),
            "apply_filter" => Ok(NoPersonBehavior::ApplyFilter),
            other => Err(format!(
                "No-person behavior must be 'keep_original' or 'apply_filter', got '{other}'"
            )),
        }
    }
}

/// Blends `frame` and `filtered` through the person mask and active region.
///
/// Outside the region the original always wins; inside it the filtered
/// rendering covers the side selected by `apply_to`. The two weights are
/// clamped separately, so they are not an exact partition of unity along
/// soft mask edges.
pub fn composite(
    frame: &Frame,
    filtered: &Frame,
    temporal_mask: &Mask,
    region_mask: &Mask,
    apply_to: ApplyTo,
) -> Frame {
    debug_assert_eq!(frame.data().len(), filtered.data().len());
    debug_assert_eq!(temporal_mask.data().len(), frame.pixel_count());
    debug_assert_eq!(region_mask.data().len(), frame.pixel_count());

    let src = frame.data();
    let flt = filtered.data();
    let mut out = Vec::with_capacity(src.len());

    for (i, (&t, &r)) in temporal_mask.data().iter().zip(region_mask.data()).enumerate() {
        let kept_side = match apply_to {
            ApplyTo::Background => t,
            ApplyTo::Person => 1.0 - t,
        };
        let filter_w = ((1.0 - kept_side) * r).clamp(0.0, 1.0);
        let keep_w = (kept_side + (1.0 - r)).clamp(0.0, 1.0);
        for c in 0..Frame::CHANNELS {
            let idx = i * Frame::CHANNELS + c;
            let v = src[idx] as f32 * keep_w + flt[idx] as f32 * filter_w;
            out.push(v.round().clamp(0.0, 255.0) as u8);
        }
    }

    Frame::new(out, frame.width(), frame.height(), frame.index())
}

/// Output for a frame without any detected person.
pub fn no_person_output(frame: &Frame, filter: &dyn FrameFilter, behavior: NoPersonBehavior) -> Frame {
    match behavior {
        NoPersonBehavior::KeepOriginal => frame.clone(),
        NoPersonBehavior::ApplyFilter => filter.filtered(frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Sets every channel to 200.
    struct Flat;

    impl FrameFilter for Flat {
        fn apply(&self, frame: &mut Frame) {
            frame.data_mut().iter_mut().for_each(|v| *v = 200);
        }
    }

    fn gradient(w: u32, h: u32) -> Frame {
        Frame::from_fn(w, h, 4, |x, y| [(x * 20) as u8, (y * 30) as u8, 7])
    }

    fn left_half(w: u32, h: u32) -> Mask {
        Mask::from_fn(w, h, |x, _| if x < w / 2 { 1.0 } else { 0.0 })
    }

    #[rstest]
    #[case(ApplyTo::Background)]
    #[case(ApplyTo::Person)]
    fn test_empty_region_leaves_frame_untouched(#[case] apply_to: ApplyTo) {
        let frame = gradient(6, 4);
        let filtered = Flat.filtered(&frame);
        let t = Mask::from_fn(6, 4, |x, y| ((x + y) % 4) as f32 / 3.0);
        let out = composite(&frame, &filtered, &t, &Mask::zeros(6, 4), apply_to);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_background_mode_keeps_person() {
        let frame = gradient(6, 4);
        let filtered = Flat.filtered(&frame);
        let out = composite(&frame, &filtered, &left_half(6, 4), &Mask::filled(6, 4, 1.0), ApplyTo::Background);
        assert_eq!(out.pixel(1, 2), frame.pixel(1, 2));
        assert_eq!(out.pixel(4, 2), [200, 200, 200]);
    }

    #[test]
    fn test_person_mode_filters_person() {
        let frame = gradient(6, 4);
        let filtered = Flat.filtered(&frame);
        let out = composite(&frame, &filtered, &left_half(6, 4), &Mask::filled(6, 4, 1.0), ApplyTo::Person);
        assert_eq!(out.pixel(1, 2), [200, 200, 200]);
        assert_eq!(out.pixel(4, 2), frame.pixel(4, 2));
    }

    #[test]
    fn test_region_limits_filtering() {
        let frame = gradient(6, 4);
        let filtered = Flat.filtered(&frame);
        let region = Mask::from_fn(6, 4, |x, _| if x >= 5 { 1.0 } else { 0.0 });
        let out = composite(&frame, &filtered, &Mask::zeros(6, 4), &region, ApplyTo::Background);
        assert_eq!(out.pixel(4, 0), frame.pixel(4, 0));
        assert_eq!(out.pixel(5, 0), [200, 200, 200]);
    }

    #[test]
    fn test_soft_edge_blends() {
        let frame = Frame::new(vec![0; 3], 1, 1, 0);
        let filtered = Frame::new(vec![100; 3], 1, 1, 0);
        let out = composite(&frame, &filtered, &Mask::filled(1, 1, 0.25), &Mask::filled(1, 1, 1.0), ApplyTo::Background);
        assert_eq!(out.pixel(0, 0), [75, 75, 75]);
        assert_eq!(out.index(), 0);
    }

    #[test]
    fn test_no_person_output() {
        let frame = gradient(3, 3);
        assert_eq!(no_person_output(&frame, &Flat, NoPersonBehavior::KeepOriginal), frame);
        let filtered = no_person_output(&frame, &Flat, NoPersonBehavior::ApplyFilter);
        assert!(filtered.data().iter().all(|&v| v == 200));
    }

    #[test]
    fn test_enum_serde_names() {
        assert_eq!(serde_json::to_string(&ApplyTo::Person).unwrap(), "\"person\"");
        assert_eq!(
            serde_json::to_string(&NoPersonBehavior::KeepOriginal).unwrap(),
            "\"keep_original\""
        );
        assert_eq!("apply_filter".parse::<NoPersonBehavior>(), Ok(NoPersonBehavior::ApplyFilter));
        assert!("both".parse::<ApplyTo>().is_err());
    }
}
