use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filtering::domain::compositor::{ApplyTo, NoPersonBehavior};
use crate::filtering::domain::filter_type::FilterType;
use crate::shared::video_metadata::VideoMetadata;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Seconds, from the container's frame count.
    pub duration: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub filter_type: FilterType,
    pub apply_to: ApplyTo,
    pub no_person_behavior: NoPersonBehavior,
    pub confidence_threshold: f32,
}

/// Final report of one processing run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_frames: usize,
    pub frames_with_person: usize,
    /// Percentage of frames with at least one person.
    pub detection_rate: f64,
    /// Wall-clock seconds.
    pub processing_time: f64,
    pub avg_fps: f64,
    pub avg_inference_time_ms: f64,
    pub video_properties: VideoProperties,
    pub filter_settings: FilterSettings,
}

impl ProcessingStats {
    pub fn new(
        frames: usize,
        frames_with_person: usize,
        inference_time: Duration,
        elapsed: Duration,
        metadata: &VideoMetadata,
        filter_settings: FilterSettings,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let per_frame = |value: f64| if frames > 0 { value / frames as f64 } else { 0.0 };

        Self {
            total_frames: frames,
            frames_with_person,
            detection_rate: per_frame(frames_with_person as f64 * 100.0),
            processing_time: secs,
            avg_fps: if secs > 0.0 { frames as f64 / secs } else { 0.0 },
            avg_inference_time_ms: per_frame(inference_time.as_secs_f64() * 1000.0),
            video_properties: VideoProperties {
                width: metadata.width,
                height: metadata.height,
                fps: metadata.fps,
                duration: metadata.duration_seconds(),
            },
            filter_settings,
        }
    }
}
