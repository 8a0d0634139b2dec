use crate::segmentation::domain::flow_estimator::{FlowEstimator, FlowField, LumaPlane};
use crate::shared::frame::Frame;
use crate::shared::mask::Mask;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemporalConfig {
    /// Weight of the motion-compensated previous mask.
    pub decay: f32,
    /// Consecutive frames without a person before history is dropped.
    pub reset_after: usize,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            decay: 0.8,
            reset_after: 6,
        }
    }
}

struct History {
    mask: Mask,
    luma: LumaPlane,
}

/// Suppresses mask flicker by carrying the previous frame's mask forward
/// along the optical flow and taking the pixelwise max with the current one.
///
/// State is one frame deep and belongs to a single processing run.
pub struct TemporalSmoother {
    config: TemporalConfig,
    flow: Box<dyn FlowEstimator>,
    history: Option<History>,
    frames_without_person: usize,
}

impl TemporalSmoother {
    pub fn new(config: TemporalConfig, flow: Box<dyn FlowEstimator>) -> Self {
        Self {
            config,
            flow,
            history: None,
            frames_without_person: 0,
        }
    }

    pub fn smooth(&mut self, refined: &Mask, frame: &Frame) -> Mask {
        self.frames_without_person = 0;
        let luma = LumaPlane::new(frame.width(), frame.height(), frame.luminance());

        let output = match self.history.take() {
            Some(prev) if prev.mask.same_size(refined) && prev.luma.data.len() == luma.data.len() => {
                match self.flow.estimate(&prev.luma, &luma) {
                    Ok(flow) => blend(refined, &warp(&prev.mask, &flow), self.config.decay),
                    Err(e) => {
                        log::debug!("Optical flow failed on frame {}: {e}", frame.index());
                        refined.clone()
                    }
                }
            }
            _ => refined.clone(),
        };

        self.history = Some(History {
            mask: output.clone(),
            luma,
        });
        output
    }

    pub fn register_no_detection(&mut self) {
        self.frames_without_person += 1;
        if self.frames_without_person >= self.config.reset_after {
            self.history = None;
        }
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }

    pub fn reset(&mut self) {
        self.history = None;
        self.frames_without_person = 0;
    }
}

/// Samples `mask` at `p + flow(p)`; samples outside the frame read as 0.
fn warp(mask: &Mask, flow: &FlowField) -> Mask {
    Mask::from_fn(mask.width(), mask.height(), |x, y| {
        let (dx, dy) = flow.at(x, y);
        mask.sample_bilinear(x as f32 + dx, y as f32 + dy)
    })
}

fn blend(current: &Mask, warped: &Mask, decay: f32) -> Mask {
    let data = current
        .data()
        .iter()
        .zip(warped.data())
        .map(|(&c, &w)| c.max(w * decay).clamp(0.0, 1.0))
        .collect();
    Mask::from_vec(current.width(), current.height(), data)
}
